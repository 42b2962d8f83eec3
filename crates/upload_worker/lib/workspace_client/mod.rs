pub mod client;
mod convert;

pub use client::{WorkspaceClient, WorkspaceClientErr};
pub use convert::block_to_json;

/// Destination container a new page is created under.
///
/// A plain page gets the new page appended as a child. A table gets a new row whose title
/// property holds the page title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentContainer {
    Page { id: String },
    Table { id: String },
}

impl ParentContainer {
    pub fn id(&self) -> &str {
        match self {
            ParentContainer::Page { id } | ParentContainer::Table { id } => id,
        }
    }

    /// Request body that creates `title` under this container.
    pub fn child_page_request(&self, title: &str, table_title_property: &str) -> serde_json::Value {
        let title_value = serde_json::json!([{ "type": "text", "text": { "content": title } }]);
        match self {
            ParentContainer::Page { id } => serde_json::json!({
                "parent": { "page_id": id },
                "properties": { "title": { "title": title_value } },
            }),
            ParentContainer::Table { id } => serde_json::json!({
                "parent": { "database_id": id },
                "properties": { table_title_property: { "title": title_value } },
            }),
        }
    }
}

/// Extracts the 32-hex-digit object id from a page URL or a bare id.
///
/// Accepts `https://host/Workspace/Some-Title-<id>?v=...`, `<id>` and the dashed UUID form.
/// Returns the id in dashed UUID form.
pub fn object_id_from_reference(reference: &str) -> Option<String> {
    let without_query = reference.trim().split(['?', '#']).next()?;
    let last_segment = without_query.trim_end_matches('/').rsplit('/').next()?;
    let compact: String = last_segment.chars().filter(|ch| *ch != '-').collect();
    if compact.len() < 32 {
        return None;
    }

    let candidate = compact.get(compact.len() - 32..)?;
    if !candidate.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }

    let hex = candidate.to_ascii_lowercase();
    Some(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}

#[cfg(test)]
mod tests {
    use super::{object_id_from_reference, ParentContainer};

    const ID: &str = "0123456789abcdef0123456789abcdef";
    const DASHED: &str = "01234567-89ab-cdef-0123-456789abcdef";

    #[test]
    fn parses_ids_from_urls_and_bare_forms() {
        let url = format!("https://www.notion.so/team/Wiki-Home-{ID}?v=abc");
        assert_eq!(object_id_from_reference(&url).as_deref(), Some(DASHED));
        assert_eq!(object_id_from_reference(ID).as_deref(), Some(DASHED));
        assert_eq!(object_id_from_reference(DASHED).as_deref(), Some(DASHED));
        assert_eq!(
            object_id_from_reference(&format!("https://www.notion.so/{}/", ID.to_uppercase()))
                .as_deref(),
            Some(DASHED)
        );
    }

    #[test]
    fn rejects_references_without_an_id() {
        assert_eq!(object_id_from_reference("https://www.notion.so/team/Wiki-Home"), None);
        assert_eq!(object_id_from_reference(""), None);
        assert_eq!(
            object_id_from_reference("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz"),
            None
        );
    }

    #[test]
    fn non_ascii_titles_do_not_break_parsing() {
        assert_eq!(
            object_id_from_reference("https://www.notion.so/Wiki-ページーページーページーページーページ"),
            None
        );
        assert_eq!(
            object_id_from_reference("ページ0123456789abcdef0123456789abcde"),
            None
        );
        let url = format!("https://www.notion.so/Wiki-ページ-{ID}");
        assert_eq!(object_id_from_reference(&url).as_deref(), Some(DASHED));
    }

    #[test]
    fn child_request_shape_depends_on_parent_type() {
        let page = ParentContainer::Page { id: "p".to_string() }.child_page_request("Cats", "Name");
        assert_eq!(page["parent"]["page_id"], "p");
        assert_eq!(
            page["properties"]["title"]["title"][0]["text"]["content"],
            "Cats"
        );

        let table =
            ParentContainer::Table { id: "t".to_string() }.child_page_request("Cats", "Name");
        assert_eq!(table["parent"]["database_id"], "t");
        assert_eq!(
            table["properties"]["Name"]["title"][0]["text"]["content"],
            "Cats"
        );
    }
}
