use std::env;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{anyhow, bail, Context, Result};
use dom_sandbox::dom::{is_tag, BlitzDom, NativeDom, NodeId};
use dom_sandbox::sandbox::{
    AppInstance, AppInstanceMap, AppRegistry, ElementSandbox, GlobalId, SandboxContext,
};
use dom_sandbox::{SandboxConfig, SandboxEnvironment};
use tracing_subscriber::EnvFilter;
use url::Url;

const USAGE: &str = "usage: sandbox_host <page.html> <app-name> <script.js>";

fn main() -> Result<()> {
    let subscriber_result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
    if subscriber_result.is_err() {
        // tracing was already initialised; continue silently
    }

    let mut args = env::args().skip(1);
    let page_path = args.next().ok_or_else(|| anyhow!(USAGE))?;
    let app_name = args.next().ok_or_else(|| anyhow!(USAGE))?;
    let script_path = args.next().ok_or_else(|| anyhow!(USAGE))?;

    let config = SandboxConfig::from_env().context("failed to load sandbox config")?;
    let page = fs::read_to_string(&page_path)
        .with_context(|| format!("failed to read page {page_path}"))?;
    let script = fs::read_to_string(&script_path)
        .with_context(|| format!("failed to read script {script_path}"))?;

    let app_url = match config.app(&app_name) {
        Some(app) => app.url.clone(),
        None => {
            let url = page_url(&page_path)?;
            tracing::warn!(
                app = %app_name,
                %url,
                "app not configured; resolving against the page URL"
            );
            url
        }
    };

    let mut dom = BlitzDom::from_html(&page);
    let container = find_element(&dom, dom.document_node(), &|dom, node| {
        is_app_container(dom, node, &app_name)
    })
    .ok_or_else(|| anyhow!("page has no <micro-app name=\"{app_name}\"> element"))?;
    let virtual_head = placeholder(&mut dom, container, &config.head_placeholder_tag)?;
    let virtual_body = placeholder(&mut dom, container, &config.body_placeholder_tag)?;
    let isolated_document = dom.create_element("micro-app-document")?;

    let global = GlobalId(1);
    let registry = Rc::new(AppInstanceMap::new());
    registry.insert(
        app_name.clone(),
        AppInstance {
            container: Some(container),
            global,
            document: isolated_document,
        },
    );

    let context = SandboxContext::new(
        app_name.clone(),
        global,
        isolated_document,
        virtual_head,
        virtual_body,
        &app_url,
    );
    let sandbox = ElementSandbox::new(dom, context, registry as Rc<dyn AppRegistry>)?
        .with_body_placeholder_tag(&config.body_placeholder_tag);

    tracing::info!(app = %app_name, container, "running {script_path}");
    let environment = SandboxEnvironment::new(sandbox)?;
    environment.eval(&script, &script_path)?;

    let dom = environment
        .into_dom()
        .ok_or_else(|| anyhow!("sandbox still borrowed after evaluation"))?;
    println!("{}", dom.serialize_document()?);
    Ok(())
}

fn page_url(page_path: &str) -> Result<Url> {
    let absolute = fs::canonicalize(Path::new(page_path))
        .with_context(|| format!("failed to resolve {page_path}"))?;
    Url::from_file_path(&absolute)
        .map_err(|()| anyhow!("{} is not a file path", absolute.display()))
}

fn is_app_container(dom: &BlitzDom, node: NodeId, app_name: &str) -> bool {
    let tag = dom.tag_name(node).ok().flatten();
    is_tag(tag.as_deref(), "micro-app")
        && dom.get_attribute(node, "name").ok().flatten().as_deref() == Some(app_name)
}

fn find_element(
    dom: &BlitzDom,
    root: NodeId,
    matches: &dyn Fn(&BlitzDom, NodeId) -> bool,
) -> Option<NodeId> {
    if matches(dom, root) {
        return Some(root);
    }
    for child in dom.child_nodes(root).ok()? {
        if let Some(found) = find_element(dom, child, matches) {
            return Some(found);
        }
    }
    None
}

/// The container's `<tag>` child, created when the page does not carry one.
fn placeholder(dom: &mut BlitzDom, container: NodeId, tag: &str) -> Result<NodeId> {
    for child in dom.child_nodes(container)? {
        if is_tag(dom.tag_name(child)?.as_deref(), tag) {
            return Ok(child);
        }
    }
    if tag.is_empty() {
        bail!("placeholder tag name must not be empty");
    }
    let node = dom.create_element(tag)?;
    dom.append_child(container, node)?;
    Ok(node)
}
