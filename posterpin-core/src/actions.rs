use crate::contract::{
    ACTIONS_PANEL, CHOOSE_BUTTON, CHOOSE_BUTTON_CLASS, CHOOSE_BUTTON_LABEL, DELETE_BUTTON_CLASS,
    DELETE_BUTTON_LABEL,
};
use crate::page::{HostPage, NodeId};

/// The two links added to the film page's actions panel. The host binds
/// their clicks to the write path's `submit` and `delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionLinks {
    pub choose: NodeId,
    pub delete: NodeId,
}

fn menu_link(page: &dyn HostPage, item_class: &str, label: &str) -> (NodeId, NodeId) {
    let item = page.create_element("li");
    page.set_attribute(item, "class", item_class);

    let link = page.create_element("a");
    page.set_attribute(link, "href", "#");
    page.set_attribute(link, "style", "color: #f0f0f0; font-weight: 600");
    page.set_text(link, label);
    page.append_child(item, link);

    (item, link)
}

/// Add "Choose your poster" and "Delete custom poster" to the actions panel.
/// Returns `None` when the panel is missing or the links are already there.
pub fn inject_action_links(page: &dyn HostPage) -> Option<ActionLinks> {
    let panel = page.query_first(page.document(), &ACTIONS_PANEL)?;
    if page.query_first(page.document(), &CHOOSE_BUTTON).is_some() {
        return None;
    }

    let (choose_item, choose) = menu_link(page, CHOOSE_BUTTON_CLASS, CHOOSE_BUTTON_LABEL);
    let (delete_item, delete) = menu_link(page, DELETE_BUTTON_CLASS, DELETE_BUTTON_LABEL);
    page.append_child(panel, choose_item);
    page.append_child(panel, delete_item);

    Some(ActionLinks { choose, delete })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{ElementSpec, MemoryPage, Selector};

    #[test]
    fn links_are_injected_exactly_once() {
        let page = MemoryPage::new("/film/dune-2021/");
        let panel = page.insert(page.body(), ElementSpec::new("ul").class("js-actions-panel"));

        let links = inject_action_links(&page).unwrap();
        assert_eq!(page.text_content(links.choose), "Choose your poster");
        assert_eq!(page.text_content(links.delete), "Delete custom poster");
        assert!(inject_action_links(&page).is_none());

        let items = page.query_all(panel, &Selector::parse("li.menu-item").unwrap());
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn missing_panel_is_skipped() {
        let page = MemoryPage::new("/film/dune-2021/");
        assert!(inject_action_links(&page).is_none());
    }
}
