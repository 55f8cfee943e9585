use std::cell::{Ref, RefCell};
use std::fmt::Display;
use std::rc::Rc;

use anyhow::Result;
use rquickjs::{Ctx, Function, IntoJs, Object};

use super::runtime::QuickJsEngine;
use crate::dom::{NativeDom, NodeId};
use crate::sandbox::{ElementInfo, ElementSandbox, PureNodeMarker};

/// A QuickJS context whose DOM surface is one sub-application's [`ElementSandbox`].
///
/// Node handles cross the boundary as decimal strings. Each [`SandboxEnvironment::eval`] is one
/// synchronous burst: once the script and its pending jobs have run, deferred work queued by the
/// sandbox is flushed.
pub struct SandboxEnvironment<D: NativeDom + 'static> {
    engine: QuickJsEngine,
    sandbox: Rc<RefCell<ElementSandbox<D>>>,
    element_info: Rc<ElementInfo>,
}

impl<D: NativeDom + 'static> SandboxEnvironment<D> {
    pub fn new(sandbox: ElementSandbox<D>) -> Result<Self> {
        Self::with_element_info(sandbox, Rc::new(ElementInfo::new()))
    }

    /// Uses `element_info` as both the ownership tagger and the pure-node marker.
    pub fn with_element_info(
        sandbox: ElementSandbox<D>,
        element_info: Rc<ElementInfo>,
    ) -> Result<Self> {
        let engine = QuickJsEngine::new()?;
        let sandbox = Rc::new(RefCell::new(
            sandbox.with_element_info(Rc::clone(&element_info)),
        ));
        install_sandbox_bindings(&engine, Rc::clone(&sandbox), Rc::clone(&element_info))?;
        engine.eval(SANDBOX_BOOTSTRAP, "sandbox-bootstrap.js")?;

        tracing::debug!(
            target: "quickjs",
            app = %sandbox.borrow().context().name(),
            "sandbox environment ready"
        );
        Ok(Self {
            engine,
            sandbox,
            element_info,
        })
    }

    pub fn eval(&self, source: &str, filename: &str) -> Result<()> {
        let result = self.engine.eval(source, filename);
        self.end_burst();
        result
    }

    pub fn eval_with<V>(&self, source: &str, filename: &str) -> Result<V>
    where
        V: for<'js> rquickjs::FromJs<'js>,
    {
        let result = self.engine.eval_with(source, filename);
        self.end_burst();
        result
    }

    /// Evaluates `expression` and returns the handle of the node it yields.
    pub fn eval_node(&self, expression: &str) -> Result<Option<NodeId>> {
        let source = format!("__sandbox_handle_of({expression})");
        let handle: Option<String> = self.eval_with(&source, "eval-node.js")?;
        match handle {
            Some(handle) => Ok(Some(handle.parse()?)),
            None => Ok(None),
        }
    }

    pub fn sandbox(&self) -> Ref<'_, ElementSandbox<D>> {
        self.sandbox.borrow()
    }

    pub fn element_info(&self) -> &Rc<ElementInfo> {
        &self.element_info
    }

    /// Tears the environment down and hands the DOM back. The app's records are dropped from
    /// the metadata table, which may outlive the environment when shared.
    pub fn into_dom(self) -> Option<D> {
        let Self {
            engine,
            sandbox,
            element_info,
        } = self;
        element_info.forget_app(sandbox.borrow().context().name());
        // The installed functions hold clones of the sandbox until the context is gone.
        drop(engine);
        Rc::try_unwrap(sandbox)
            .ok()
            .map(|sandbox| sandbox.into_inner().into_dom())
    }

    fn end_burst(&self) {
        let ran = self.sandbox.borrow().end_burst();
        if ran > 0 {
            tracing::debug!(target: "quickjs", tasks = ran, "flushed deferred sandbox work");
        }
    }
}

fn dom_error<T>(ctx: &Ctx<'_>, err: impl Display) -> rquickjs::Result<T> {
    tracing::error!(target: "quickjs", "DOM operation failed: {err}");
    let message = format!("DOM operation failed: {err}");
    let value = message.into_js(ctx)?;
    Err(ctx.throw(value))
}

fn node_id(ctx: &Ctx<'_>, handle: &str) -> rquickjs::Result<NodeId> {
    match handle.parse::<NodeId>() {
        Ok(id) => Ok(id),
        Err(_) => dom_error(ctx, format!("invalid node handle '{handle}'")),
    }
}

fn handle(node: NodeId) -> String {
    node.to_string()
}

fn install<'js>(global: &Object<'js>, name: &str, func: Function<'js>) -> rquickjs::Result<()> {
    global.set(name, func.with_name(name)?)
}

fn install_sandbox_bindings<D: NativeDom + 'static>(
    engine: &QuickJsEngine,
    sandbox: Rc<RefCell<ElementSandbox<D>>>,
    element_info: Rc<ElementInfo>,
) -> Result<()> {
    engine.with_context(|ctx| {
        let global = ctx.globals();

        // Document entry points
        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(ctx.clone(), move || -> rquickjs::Result<String> {
                Ok(handle(sandbox_ref.borrow().context().isolated_document()))
            })?;
            install(&global, "__sandbox_isolated_document", func)?;
        }

        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(ctx.clone(), move || -> rquickjs::Result<String> {
                Ok(handle(sandbox_ref.borrow().document_head()))
            })?;
            install(&global, "__sandbox_document_head", func)?;
        }

        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(ctx.clone(), move || -> rquickjs::Result<String> {
                Ok(handle(sandbox_ref.borrow().document_body()))
            })?;
            install(&global, "__sandbox_document_body", func)?;
        }

        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(ctx.clone(), move || -> rquickjs::Result<Option<String>> {
                Ok(sandbox_ref.borrow().dom().document_element().map(handle))
            })?;
            install(&global, "__sandbox_document_element", func)?;
        }

        // Construction
        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>, tag: String| -> rquickjs::Result<String> {
                    let mut sandbox = sandbox_ref.borrow_mut();
                    match sandbox.dom_mut().create_element(&tag) {
                        Ok(node) => Ok(handle(node)),
                        Err(err) => dom_error(&ctx, err),
                    }
                },
            )?;
            install(&global, "__sandbox_create_element", func)?;
        }

        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>, data: Option<String>| -> rquickjs::Result<String> {
                    let mut sandbox = sandbox_ref.borrow_mut();
                    match sandbox
                        .dom_mut()
                        .create_text_node(data.as_deref().unwrap_or_default())
                    {
                        Ok(node) => Ok(handle(node)),
                        Err(err) => dom_error(&ctx, err),
                    }
                },
            )?;
            install(&global, "__sandbox_create_text", func)?;
        }

        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>,
                      width: Option<f64>,
                      height: Option<f64>|
                      -> rquickjs::Result<String> {
                    let width = width.map(image_dimension);
                    let height = height.map(image_dimension);
                    match sandbox_ref.borrow_mut().construct_image(width, height) {
                        Ok(node) => Ok(handle(node)),
                        Err(err) => dom_error(&ctx, err),
                    }
                },
            )?;
            install(&global, "__sandbox_create_image", func)?;
        }

        // Structural mutation
        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>, parent: String, node: String| -> rquickjs::Result<String> {
                    let parent = node_id(&ctx, &parent)?;
                    let node = node_id(&ctx, &node)?;
                    match sandbox_ref.borrow_mut().append_child(parent, node) {
                        Ok(node) => Ok(handle(node)),
                        Err(err) => dom_error(&ctx, err),
                    }
                },
            )?;
            install(&global, "__sandbox_append_child", func)?;
        }

        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>,
                      parent: String,
                      node: String,
                      reference: Option<String>|
                      -> rquickjs::Result<String> {
                    let parent = node_id(&ctx, &parent)?;
                    let node = node_id(&ctx, &node)?;
                    let reference = match reference {
                        Some(reference) => Some(node_id(&ctx, &reference)?),
                        None => None,
                    };
                    match sandbox_ref
                        .borrow_mut()
                        .insert_before(parent, node, reference)
                    {
                        Ok(node) => Ok(handle(node)),
                        Err(err) => dom_error(&ctx, err),
                    }
                },
            )?;
            install(&global, "__sandbox_insert_before", func)?;
        }

        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>,
                      parent: String,
                      node: String,
                      child: String|
                      -> rquickjs::Result<String> {
                    let parent = node_id(&ctx, &parent)?;
                    let node = node_id(&ctx, &node)?;
                    let child = node_id(&ctx, &child)?;
                    match sandbox_ref.borrow_mut().replace_child(parent, node, child) {
                        Ok(removed) => Ok(handle(removed)),
                        Err(err) => dom_error(&ctx, err),
                    }
                },
            )?;
            install(&global, "__sandbox_replace_child", func)?;
        }

        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>, node: String, deep: bool| -> rquickjs::Result<String> {
                    let node = node_id(&ctx, &node)?;
                    match sandbox_ref.borrow_mut().clone_node(node, deep) {
                        Ok(clone) => Ok(handle(clone)),
                        Err(err) => dom_error(&ctx, err),
                    }
                },
            )?;
            install(&global, "__sandbox_clone_node", func)?;
        }

        // Traversal
        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>, node: String| -> rquickjs::Result<Option<String>> {
                    let node = node_id(&ctx, &node)?;
                    match sandbox_ref.borrow().parent_node(node) {
                        Ok(parent) => Ok(parent.map(handle)),
                        Err(err) => dom_error(&ctx, err),
                    }
                },
            )?;
            install(&global, "__sandbox_parent_node", func)?;
        }

        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>, node: String| -> rquickjs::Result<String> {
                    let node = node_id(&ctx, &node)?;
                    match sandbox_ref.borrow().get_root_node(node) {
                        Ok(root) => Ok(handle(root)),
                        Err(err) => dom_error(&ctx, err),
                    }
                },
            )?;
            install(&global, "__sandbox_get_root_node", func)?;
        }

        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>, ancestor: String, node: String| -> rquickjs::Result<bool> {
                    let ancestor = node_id(&ctx, &ancestor)?;
                    let node = node_id(&ctx, &node)?;
                    Ok(sandbox_ref.borrow().dom().contains(ancestor, node))
                },
            )?;
            install(&global, "__sandbox_contains", func)?;
        }

        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>, node: String| -> rquickjs::Result<Vec<String>> {
                    let node = node_id(&ctx, &node)?;
                    match sandbox_ref.borrow().dom().child_nodes(node) {
                        Ok(children) => Ok(children.into_iter().map(handle).collect()),
                        Err(err) => dom_error(&ctx, err),
                    }
                },
            )?;
            install(&global, "__sandbox_child_nodes", func)?;
        }

        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>, node: String| -> rquickjs::Result<Option<String>> {
                    let node = node_id(&ctx, &node)?;
                    match sandbox_ref.borrow().dom().tag_name(node) {
                        Ok(tag) => Ok(tag),
                        Err(err) => dom_error(&ctx, err),
                    }
                },
            )?;
            install(&global, "__sandbox_tag_name", func)?;
        }

        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>, node: String| -> rquickjs::Result<String> {
                    let node = node_id(&ctx, &node)?;
                    match sandbox_ref.borrow().dom().text_content(node) {
                        Ok(text) => Ok(text),
                        Err(err) => dom_error(&ctx, err),
                    }
                },
            )?;
            install(&global, "__sandbox_text_content", func)?;
        }

        // Attributes and URL properties
        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>,
                      node: String,
                      name: String|
                      -> rquickjs::Result<Option<String>> {
                    let node = node_id(&ctx, &node)?;
                    match sandbox_ref.borrow().dom().get_attribute(node, &name) {
                        Ok(value) => Ok(value),
                        Err(err) => dom_error(&ctx, err),
                    }
                },
            )?;
            install(&global, "__sandbox_get_attribute", func)?;
        }

        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>,
                      node: String,
                      name: String,
                      value: String|
                      -> rquickjs::Result<()> {
                    let node = node_id(&ctx, &node)?;
                    match sandbox_ref.borrow_mut().set_attribute(node, &name, &value) {
                        Ok(()) => Ok(()),
                        Err(err) => dom_error(&ctx, err),
                    }
                },
            )?;
            install(&global, "__sandbox_set_attribute", func)?;
        }

        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>, node: String, name: String| -> rquickjs::Result<String> {
                    let node = node_id(&ctx, &node)?;
                    match sandbox_ref.borrow().get_url_property(node, &name) {
                        Ok(value) => Ok(value),
                        Err(err) => dom_error(&ctx, err),
                    }
                },
            )?;
            install(&global, "__sandbox_get_url_property", func)?;
        }

        {
            let sandbox_ref = Rc::clone(&sandbox);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>,
                      node: String,
                      name: String,
                      value: String|
                      -> rquickjs::Result<()> {
                    let node = node_id(&ctx, &node)?;
                    match sandbox_ref.borrow_mut().set_url_property(node, &name, &value) {
                        Ok(()) => Ok(()),
                        Err(err) => dom_error(&ctx, err),
                    }
                },
            )?;
            install(&global, "__sandbox_set_url_property", func)?;
        }

        // Pure-node marker
        {
            let info_ref = Rc::clone(&element_info);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>, node: String| -> rquickjs::Result<bool> {
                    let node = node_id(&ctx, &node)?;
                    Ok(info_ref.is_pure(node))
                },
            )?;
            install(&global, "__sandbox_is_pure", func)?;
        }

        {
            let info_ref = Rc::clone(&element_info);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>, node: String, pure: bool| -> rquickjs::Result<()> {
                    let node = node_id(&ctx, &node)?;
                    if pure {
                        info_ref.mark_pure(node);
                    } else {
                        info_ref.clear_pure(node);
                    }
                    Ok(())
                },
            )?;
            install(&global, "__sandbox_set_pure", func)?;
        }

        Ok(())
    })
}

/// `new Image(w, h)` converts its arguments to `unsigned long` and reflects them; values above
/// 2147483647 reflect as 0.
fn image_dimension(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    let wrapped = value.trunc().rem_euclid(4_294_967_296.0) as u32;
    if wrapped > i32::MAX as u32 {
        0
    } else {
        wrapped
    }
}

const SANDBOX_BOOTSTRAP: &str = r#"
(() => {
    const global = globalThis;
    const HANDLE = Symbol('sandbox.handle');
    const wrappers = new Map();
    const documentHandle = global.__sandbox_isolated_document();

    const illegal = (name) => function () {
        throw new TypeError(`Failed to construct '${name}': Illegal constructor`);
    };
    const Node = illegal('Node');
    const Element = illegal('Element');
    const HTMLElement = illegal('HTMLElement');
    const HTMLImageElement = illegal('HTMLImageElement');
    const HTMLScriptElement = illegal('HTMLScriptElement');
    const HTMLLinkElement = illegal('HTMLLinkElement');
    const HTMLBaseElement = illegal('HTMLBaseElement');
    const Text = illegal('Text');

    const inherit = (child, parent) => {
        child.prototype = Object.create(parent.prototype, {
            constructor: { value: child, writable: true, configurable: true },
        });
    };
    inherit(Element, Node);
    inherit(HTMLElement, Element);
    inherit(HTMLImageElement, HTMLElement);
    inherit(HTMLScriptElement, HTMLElement);
    inherit(HTMLLinkElement, HTMLElement);
    inherit(HTMLBaseElement, HTMLElement);
    inherit(Text, Node);

    const prototypeFor = (tagName) => {
        switch (tagName) {
            case null:
            case undefined:
                return Text.prototype;
            case 'IMG':
                return HTMLImageElement.prototype;
            case 'SCRIPT':
                return HTMLScriptElement.prototype;
            case 'LINK':
                return HTMLLinkElement.prototype;
            case 'BASE':
                return HTMLBaseElement.prototype;
            default:
                return HTMLElement.prototype;
        }
    };

    const document = {};

    const wrap = (handle) => {
        if (handle === null || handle === undefined) {
            return null;
        }
        if (handle === documentHandle) {
            return document;
        }
        let node = wrappers.get(handle);
        if (!node) {
            node = Object.create(prototypeFor(global.__sandbox_tag_name(handle)));
            Object.defineProperty(node, HANDLE, { value: handle });
            wrappers.set(handle, node);
        }
        return node;
    };

    const unwrap = (node) => {
        if (node === document) {
            return documentHandle;
        }
        if (node === null || typeof node !== 'object' || node[HANDLE] === undefined) {
            throw new TypeError("parameter is not of type 'Node'");
        }
        return node[HANDLE];
    };

    const getter = (proto, name, get) => {
        Object.defineProperty(proto, name, { configurable: true, enumerable: true, get });
    };

    Node.prototype.appendChild = function appendChild(node) {
        return wrap(global.__sandbox_append_child(unwrap(this), unwrap(node)));
    };
    Node.prototype.insertBefore = function insertBefore(node, child) {
        const reference = child === null || child === undefined ? null : unwrap(child);
        return wrap(global.__sandbox_insert_before(unwrap(this), unwrap(node), reference));
    };
    Node.prototype.replaceChild = function replaceChild(node, child) {
        return wrap(global.__sandbox_replace_child(unwrap(this), unwrap(node), unwrap(child)));
    };
    Node.prototype.cloneNode = function cloneNode(deep) {
        return wrap(global.__sandbox_clone_node(unwrap(this), !!deep));
    };
    Node.prototype.contains = function contains(other) {
        if (other === null || other === undefined) {
            return false;
        }
        return global.__sandbox_contains(unwrap(this), unwrap(other));
    };
    Node.prototype.getRootNode = function getRootNode() {
        return wrap(global.__sandbox_get_root_node(unwrap(this)));
    };
    getter(Node.prototype, 'parentNode', function () {
        return wrap(global.__sandbox_parent_node(unwrap(this)));
    });
    getter(Node.prototype, 'childNodes', function () {
        return global.__sandbox_child_nodes(unwrap(this)).map(wrap);
    });
    getter(Node.prototype, 'firstChild', function () {
        const children = global.__sandbox_child_nodes(unwrap(this));
        return children.length ? wrap(children[0]) : null;
    });
    getter(Node.prototype, 'lastChild', function () {
        const children = global.__sandbox_child_nodes(unwrap(this));
        return children.length ? wrap(children[children.length - 1]) : null;
    });
    getter(Node.prototype, 'textContent', function () {
        return global.__sandbox_text_content(unwrap(this));
    });
    getter(Node.prototype, 'nodeName', function () {
        return global.__sandbox_tag_name(unwrap(this)) || '#text';
    });

    getter(Element.prototype, 'tagName', function () {
        return global.__sandbox_tag_name(unwrap(this));
    });
    Element.prototype.getAttribute = function getAttribute(name) {
        return global.__sandbox_get_attribute(unwrap(this), String(name));
    };
    Element.prototype.setAttribute = function setAttribute(name, value) {
        global.__sandbox_set_attribute(unwrap(this), String(name), String(value));
    };

    const urlProperty = (ctor, name) => {
        Object.defineProperty(ctor.prototype, name, {
            configurable: true,
            enumerable: true,
            get() {
                return global.__sandbox_get_url_property(unwrap(this), name);
            },
            set(value) {
                global.__sandbox_set_url_property(unwrap(this), name, String(value));
            },
        });
    };
    urlProperty(HTMLImageElement, 'src');
    urlProperty(HTMLScriptElement, 'src');
    urlProperty(HTMLLinkElement, 'href');

    const pureMarker = (ctor) => {
        Object.defineProperty(ctor.prototype, '__PURE_ELEMENT__', {
            configurable: true,
            get() {
                return global.__sandbox_is_pure(unwrap(this));
            },
            set(value) {
                global.__sandbox_set_pure(unwrap(this), !!value);
            },
        });
    };
    pureMarker(HTMLScriptElement);
    pureMarker(HTMLBaseElement);

    function Image(width, height) {
        if (!new.target) {
            throw new TypeError("Failed to construct 'Image': Please use the 'new' operator");
        }
        return wrap(global.__sandbox_create_image(
            width === undefined ? null : Number(width),
            height === undefined ? null : Number(height),
        ));
    }
    Image.prototype = HTMLImageElement.prototype;

    getter(document, 'head', () => wrap(global.__sandbox_document_head()));
    getter(document, 'body', () => wrap(global.__sandbox_document_body()));
    getter(document, 'documentElement', () => wrap(global.__sandbox_document_element()));
    document.createElement = (tagName) => wrap(global.__sandbox_create_element(String(tagName)));
    document.createTextNode = (data) => wrap(global.__sandbox_create_text(String(data)));

    global.__sandbox_handle_of = (node) => {
        return node === null || node === undefined ? null : unwrap(node);
    };

    Object.assign(global, {
        Node,
        Element,
        HTMLElement,
        HTMLImageElement,
        HTMLScriptElement,
        HTMLLinkElement,
        HTMLBaseElement,
        Text,
        Image,
        document,
    });
})();
"#;
