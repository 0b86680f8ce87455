use super::ResourceCollection;
use crate::model::{Resource, ResourceDraft};
use crate::transport::HttpRequest;
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::{Arc, LazyLock};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z0-9_.]+)\}").expect("placeholder regex is valid")
});

/// A collection described by data instead of code.
///
/// `path` and the optional name template may reference the owning resource
/// with `{parent.<metadata key>}`, `{parent.name}` and `{parent.fqn}`;
/// `parent.` can be repeated to reach further up. Item fields are located
/// with JSON pointers.
pub struct JsonCollection {
    label: String,
    resource_type: String,
    path: String,
    items_pointer: String,
    id_pointer: String,
    name_pointer: Option<String>,
    fqn_template: Option<String>,
    metadata: Vec<(String, String)>,
    required_permission: Option<String>,
    children: Vec<Arc<dyn ResourceCollection>>,
}

impl JsonCollection {
    pub fn new(label: &str, resource_type: &str, path: &str) -> Self {
        Self {
            label: label.to_string(),
            resource_type: resource_type.to_string(),
            path: path.to_string(),
            items_pointer: String::new(),
            id_pointer: "/id".to_string(),
            name_pointer: None,
            fqn_template: None,
            metadata: Vec::new(),
            required_permission: None,
            children: Vec::new(),
        }
    }

    /// Where the item array lives in the response (empty for a bare array).
    pub fn items_at(mut self, pointer: &str) -> Self {
        self.items_pointer = pointer.to_string();
        self
    }

    pub fn id_at(mut self, pointer: &str) -> Self {
        self.id_pointer = pointer.to_string();
        self
    }

    /// Display name field; defaults to the id.
    pub fn name_at(mut self, pointer: &str) -> Self {
        self.name_pointer = Some(pointer.to_string());
        self
    }

    /// Override the default `<parent fqn>/<type>/<id>` naming. Besides the
    /// parent placeholders, `{id}` and `{name}` refer to the item.
    pub fn fqn(mut self, template: &str) -> Self {
        self.fqn_template = Some(template.to_string());
        self
    }

    /// Copy the value at `pointer` into the resource's metadata under `key`.
    pub fn metadata(mut self, key: &str, pointer: &str) -> Self {
        self.metadata.push((key.to_string(), pointer.to_string()));
        self
    }

    pub fn requires(mut self, permission: &str) -> Self {
        self.required_permission = Some(permission.to_string());
        self
    }

    pub fn child(mut self, collection: Arc<dyn ResourceCollection>) -> Self {
        self.children.push(collection);
        self
    }

    fn draft(&self, item: &Value, parent: Option<&Resource>) -> Result<ResourceDraft, String> {
        let id = item
            .pointer(&self.id_pointer)
            .and_then(scalar)
            .ok_or_else(|| format!("{} item has no id at '{}'", self.label, self.id_pointer))?;
        let name = self
            .name_pointer
            .as_ref()
            .and_then(|p| item.pointer(p))
            .and_then(scalar)
            .unwrap_or_else(|| id.clone());

        let fully_qualified_name = match &self.fqn_template {
            Some(template) => render(template, |key| match key {
                "id" => Some(id.clone()),
                "name" => Some(name.clone()),
                _ => parent_value(parent, key),
            })?,
            None => match parent {
                Some(p) => format!("{}/{}/{}", p.fully_qualified_name, self.resource_type, id),
                None => format!("{}/{}", self.resource_type, id),
            },
        };

        let mut draft = ResourceDraft::new(name, fully_qualified_name, &self.resource_type);
        for (key, pointer) in &self.metadata {
            if let Some(value) = item.pointer(pointer) {
                draft.metadata.insert(key.clone(), value.clone());
            }
        }
        Ok(draft)
    }
}

impl ResourceCollection for JsonCollection {
    fn label(&self) -> &str {
        &self.label
    }

    fn required_permission(&self) -> Option<&str> {
        self.required_permission.as_deref()
    }

    fn request(&self, parent: Option<&Resource>) -> Result<HttpRequest, String> {
        render(&self.path, |key| parent_value(parent, key)).map(HttpRequest::get)
    }

    fn extract(&self, body: &str, parent: Option<&Resource>) -> Result<Vec<ResourceDraft>, String> {
        let document: Value = serde_json::from_str(body).map_err(|e| e.to_string())?;
        let items = document
            .pointer(&self.items_pointer)
            .and_then(Value::as_array)
            .ok_or_else(|| format!("expected an array at '{}'", self.items_pointer))?;
        items.iter().map(|item| self.draft(item, parent)).collect()
    }

    fn children(&self) -> &[Arc<dyn ResourceCollection>] {
        &self.children
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Resolve `parent.<...>` placeholders against the ancestor chain.
fn parent_value(parent: Option<&Resource>, key: &str) -> Option<String> {
    let rest = key.strip_prefix("parent.")?;
    let resource = parent?;
    if rest.starts_with("parent.") {
        return parent_value(resource.parent.as_deref(), rest);
    }
    match rest {
        "name" => Some(resource.name.clone()),
        "fqn" => Some(resource.fully_qualified_name.clone()),
        field => resource.metadata.get(field).and_then(scalar),
    }
}

fn render(template: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String, String> {
    let mut missing: Option<String> = None;
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        lookup(&caps[1]).unwrap_or_else(|| {
            missing.get_or_insert_with(|| caps[1].to_string());
            String::new()
        })
    });
    match missing {
        Some(key) => Err(format!("no value for placeholder '{{{}}}' in '{}'", key, template)),
        None => Ok(rendered.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project() -> Resource {
        let mut org = Resource::new("acme", "org/acme", "org");
        org.metadata.insert("slug".into(), json!("acme"));
        let mut project = Resource::new("Web", "org/acme/project/web", "project");
        project.metadata.insert("key".into(), json!("web"));
        project.parent = Some(Box::new(org));
        project
    }

    #[test]
    fn test_path_uses_ancestor_metadata() {
        let collection = JsonCollection::new(
            "environments",
            "environment",
            "/orgs/{parent.parent.slug}/projects/{parent.key}/environments",
        );
        let request = collection.request(Some(&project())).unwrap();
        assert_eq!(request.path, "/orgs/acme/projects/web/environments");
    }

    #[test]
    fn test_missing_placeholder_is_an_error() {
        let collection = JsonCollection::new("environments", "environment", "/projects/{parent.key}");
        let err = collection.request(None).unwrap_err();
        assert!(err.contains("parent.key"));
    }

    #[test]
    fn test_extract_items_with_metadata() {
        let collection = JsonCollection::new("environments", "environment", "/unused")
            .items_at("/items")
            .id_at("/_id")
            .name_at("/name")
            .metadata("key", "/key")
            .metadata("critical", "/critical");
        let body = json!({
            "items": [
                {"_id": 17, "name": "Production", "key": "production", "critical": true},
                {"_id": 18, "key": "test"}
            ]
        })
        .to_string();

        let drafts = collection.extract(&body, Some(&project())).unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].name, "Production");
        assert_eq!(
            drafts[0].fully_qualified_name,
            "org/acme/project/web/environment/17"
        );
        assert_eq!(drafts[0].metadata["critical"], json!(true));
        assert_eq!(drafts[1].name, "18");
        assert!(!drafts[1].metadata.contains_key("critical"));
    }

    #[test]
    fn test_fqn_template() {
        let collection = JsonCollection::new("repositories", "repository", "/repos")
            .id_at("/name")
            .fqn("{parent.name}/{id}/repository");
        let mut user = Resource::new("octo", "user/octo", "user");
        user.metadata.insert("login".into(), json!("octo"));
        let drafts = collection
            .extract(r#"[{"name": "api"}]"#, Some(&user))
            .unwrap();
        assert_eq!(drafts[0].fully_qualified_name, "octo/api/repository");
    }

    #[test]
    fn test_extract_rejects_wrong_shape() {
        let collection = JsonCollection::new("projects", "project", "/projects").items_at("/items");
        assert!(collection.extract(r#"{"items": {}}"#, None).is_err());
        assert!(collection.extract("not json", None).is_err());
        assert!(collection
            .extract(r#"{"items": [{"name": "no id"}]}"#, None)
            .is_err());
    }
}
