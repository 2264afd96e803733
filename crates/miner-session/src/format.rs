//! Client-facing JSON renderings of stored entities

use miner_graph::{Document, Method, RecordStore, Subset};
use miner_protocol::{MethodId, SubsetId};
use serde_json::{json, Map, Value};

/// Subset summary; references to deleted methods are left out
#[must_use]
pub fn subset(store: &RecordStore, subset: &Subset) -> Value {
    let used_by: Vec<MethodId> = subset
        .used_by
        .iter()
        .copied()
        .filter(|m| store.live_method(*m).is_ok())
        .collect();
    json!({
        "id": subset.id,
        "label": subset.label,
        "description": subset.description,
        "resultedIn": subset.resulted_in.filter(|m| store.live_method(*m).is_ok()),
        "usedBy": used_by,
        "size": subset.has_elements.len(),
        "modified": subset.modified,
        "metadata": subset.metadata,
    })
}

/// Method with its parameters and result
#[must_use]
pub fn method(store: &RecordStore, method: &Method) -> Value {
    let produced: Vec<SubsetId> = store.live_produced(method.id);
    json!({
        "id": method.id,
        "type": method.method_type,
        "status": method.status,
        "parameters": method.parameters,
        "result": method.result,
        "appliedOn": method.applied_on,
        "produced": produced,
        "modified": method.modified,
    })
}

/// Document values plus the live subsets containing it
#[must_use]
pub fn document(store: &RecordStore, document: &Document) -> Value {
    let values: Map<String, Value> = document
        .values
        .iter()
        .map(|(field, value)| {
            (
                field.clone(),
                value.as_ref().map_or(Value::Null, |v| v.to_json()),
            )
        })
        .collect();
    let in_subsets: Vec<SubsetId> = document
        .in_subsets
        .iter()
        .copied()
        .filter(|s| store.live_subset(*s).is_ok())
        .collect();
    json!({
        "id": document.id,
        "values": values,
        "inSubsets": in_subsets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use miner_graph::{FieldValue, NewMethod, NewSubset};
    use miner_protocol::{DocumentId, MethodType};

    #[test]
    fn renders_live_references_only() {
        let mut store = RecordStore::new();
        let mut values = IndexMap::new();
        values.insert("title".to_string(), Some(FieldValue::Text("hi".into())));
        values.insert("score".to_string(), None);
        store.add_document(values);

        let root = store
            .create_subset(NewSubset::new("root", vec![DocumentId(0)]))
            .unwrap();
        let method = store
            .create_method(NewMethod {
                method_type: MethodType::Aggregate,
                parameters: json!({}),
                applied_on: Some(root),
            })
            .unwrap();
        let child = store
            .create_subset(NewSubset::new("child", vec![DocumentId(0)]).with_resulted_in(method))
            .unwrap();

        let rendered = subset(&store, store.subset(root).unwrap());
        assert_eq!(rendered["usedBy"], json!([0]));
        assert_eq!(rendered["size"], 1);

        store.delete_subset(child);
        let rendered = method_json(&store, method);
        assert_eq!(rendered["produced"], json!([]));

        let doc = document(&store, store.document(DocumentId(0)).unwrap());
        assert_eq!(doc["values"], json!({"title": "hi", "score": null}));
        assert_eq!(doc["inSubsets"], json!([0]));
    }

    fn method_json(store: &RecordStore, id: MethodId) -> Value {
        match store.method(id) {
            Ok(m) => method(store, m),
            Err(_) => Value::Null,
        }
    }
}
