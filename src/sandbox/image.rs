use super::ElementSandbox;
use crate::dom::{DomResult, NativeDom, NodeId};

impl<D: NativeDom> ElementSandbox<D> {
    /// `new Image(width, height)`: the native constructor, then ownership tagging.
    pub fn construct_image(
        &mut self,
        width: Option<u32>,
        height: Option<u32>,
    ) -> DomResult<NodeId> {
        let image = self.dom.create_element("img")?;
        if let Some(width) = width {
            self.dom.set_attribute(image, "width", &width.to_string())?;
        }
        if let Some(height) = height {
            self.dom.set_attribute(image, "height", &height.to_string())?;
        }
        Ok(self.tag(image))
    }
}

#[cfg(test)]
mod tests {
    use crate::dom::NativeDom;
    use crate::sandbox::testing::{sandbox, APP_NAME};

    #[test]
    fn constructed_images_are_tagged() {
        let (mut sandbox, _) = sandbox(false);
        let image = sandbox.construct_image(None, None).unwrap();

        assert_eq!(sandbox.dom().tag_name(image).unwrap().as_deref(), Some("IMG"));
        assert_eq!(sandbox.owner(image).unwrap().app_name, APP_NAME);
        assert_eq!(sandbox.dom().parent_node(image).unwrap(), None);
    }

    #[test]
    fn dimensions_become_attributes() {
        let (mut sandbox, _) = sandbox(true);
        let image = sandbox.construct_image(Some(120), Some(40)).unwrap();

        assert_eq!(
            sandbox.dom().get_attribute(image, "width").unwrap().as_deref(),
            Some("120")
        );
        assert_eq!(
            sandbox.dom().get_attribute(image, "height").unwrap().as_deref(),
            Some("40")
        );
    }
}
