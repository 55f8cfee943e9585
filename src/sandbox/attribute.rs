use super::url::{completion_path, completion_srcset};
use super::{ElementSandbox, SandboxError};
use crate::dom::{is_tag, DomResult, NativeDom, NodeId};

/// URL-bearing IDL properties whose setter completes relative URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlProperty {
    ImageSrc,
    ScriptSrc,
    LinkHref,
}

impl UrlProperty {
    /// The property `name` defines on an element with tag name `tag`, if it is one of ours.
    pub fn lookup(tag: Option<&str>, name: &str) -> Option<Self> {
        match name {
            "src" if is_tag(tag, "img") => Some(Self::ImageSrc),
            "src" if is_tag(tag, "script") => Some(Self::ScriptSrc),
            "href" if is_tag(tag, "link") => Some(Self::LinkHref),
            _ => None,
        }
    }

    /// The content attribute the property reflects.
    pub fn attribute(self) -> &'static str {
        match self {
            Self::ImageSrc | Self::ScriptSrc => "src",
            Self::LinkHref => "href",
        }
    }
}

fn completes_attribute(tag: Option<&str>, key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    ((key == "src" || key == "srcset") && (is_tag(tag, "img") || is_tag(tag, "script")))
        || (key == "href" && is_tag(tag, "link"))
}

impl<D: NativeDom> ElementSandbox<D> {
    /// `Element.prototype.setAttribute`. `src`/`srcset` on img/script and `href` on link are
    /// resolved against the app's base URL first.
    pub fn set_attribute(&mut self, node: NodeId, key: &str, value: &str) -> DomResult<()> {
        let tag = self.dom.tag_name(node)?;
        if !completes_attribute(tag.as_deref(), key) {
            return self.dom.set_attribute(node, key, value);
        }

        let base = self.context.base_url();
        let completed = if key.eq_ignore_ascii_case("srcset") {
            completion_srcset(value, base)
        } else {
            completion_path(value, base)
        };
        self.dom.set_attribute(node, key, &completed)
    }

    /// Setter of `HTMLImageElement.src`, `HTMLScriptElement.src` and `HTMLLinkElement.href`.
    /// Lands on the same value `set_attribute` would for the same input.
    pub fn set_url_property(
        &mut self,
        node: NodeId,
        name: &str,
        value: &str,
    ) -> Result<(), SandboxError> {
        let property = self.url_property(node, name)?;
        let completed = completion_path(value, self.context.base_url());
        self.dom
            .set_attribute(node, property.attribute(), &completed)?;
        Ok(())
    }

    /// Getter of the same properties; a plain read of the reflected attribute.
    pub fn get_url_property(&self, node: NodeId, name: &str) -> Result<String, SandboxError> {
        let property = self.url_property(node, name)?;
        Ok(self
            .dom
            .get_attribute(node, property.attribute())?
            .unwrap_or_default())
    }

    fn url_property(&self, node: NodeId, name: &str) -> Result<UrlProperty, SandboxError> {
        let tag = self.dom.tag_name(node)?;
        UrlProperty::lookup(tag.as_deref(), name).ok_or_else(|| SandboxError::UnsupportedProperty {
            tag: tag.unwrap_or_else(|| "#node".to_string()).to_ascii_lowercase(),
            property: name.to_string(),
        })
    }
}
