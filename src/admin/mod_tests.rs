// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `admin/mod.rs`

#[cfg(test)]
mod tests {
    use super::super::{collection_url, object_url, parse_list};
    use crate::dataplane::ObjectKind;
    use crate::errors::AdminApiError;
    use serde_json::json;

    #[test]
    fn test_urls_trim_trailing_slash() {
        assert_eq!(
            collection_url("http://apisix:9180/", ObjectKind::Route),
            "http://apisix:9180/apisix/admin/routes"
        );
        assert_eq!(
            object_url("http://apisix:9180", ObjectKind::PluginMetadata, "prometheus"),
            "http://apisix:9180/apisix/admin/plugin_metadata/prometheus"
        );
    }

    #[test]
    fn test_parse_list_reads_ids_and_labels() {
        let body = json!({
            "total": 2,
            "list": [
                {
                    "key": "/apisix/routes/abc",
                    "value": {"id": "abc", "labels": {"managed-by": "apisix-ingress-controller"}}
                },
                {"key": "/apisix/upstreams/7", "value": {"id": 7}}
            ]
        });
        let objects = parse_list(&body).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].id, "abc");
        assert_eq!(
            objects[0].labels.get("managed-by").map(String::as_str),
            Some("apisix-ingress-controller")
        );
        assert_eq!(objects[1].id, "7");
        assert!(objects[1].labels.is_empty());
    }

    #[test]
    fn test_parse_list_consumer_uses_username() {
        let body = json!({"list": [{"key": "/apisix/consumers/jack", "value": {"username": "jack"}}]});
        assert_eq!(parse_list(&body).unwrap()[0].id, "jack");
    }

    #[test]
    fn test_parse_list_falls_back_to_key() {
        let body = json!({"list": [{"key": "/apisix/global_rules/global", "value": {"plugins": {}}}]});
        assert_eq!(parse_list(&body).unwrap()[0].id, "global");
    }

    #[test]
    fn test_parse_list_empty_shapes() {
        assert!(parse_list(&json!({})).unwrap().is_empty());
        assert!(parse_list(&json!({"list": {}})).unwrap().is_empty());
        assert!(parse_list(&json!({"total": 0, "list": []})).unwrap().is_empty());
    }

    #[test]
    fn test_parse_list_entry_without_id_is_decode_error() {
        let body = json!({"list": [{"value": {"plugins": {}}}]});
        assert!(matches!(parse_list(&body), Err(AdminApiError::Decode(_))));
    }
}
