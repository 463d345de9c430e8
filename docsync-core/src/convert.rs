//! Pure rewriting of rendered content trees.
//!
//! The renderer leaves placeholder tokens where embedded assets belong; once
//! the media resolver has produced public URLs, this module substitutes them
//! throughout the JSON tree. No backend calls happen here.

use std::collections::HashMap;

use crate::media::ResolvedAsset;

/// Replaces every occurrence of each placeholder token, in any string value
/// anywhere in the tree, with the asset's public URL.
pub fn inject_assets(content: &mut serde_json::Value, resolved: &HashMap<String, ResolvedAsset>) {
    if resolved.is_empty() {
        return;
    }
    walk(content, resolved);
}

fn walk(value: &mut serde_json::Value, resolved: &HashMap<String, ResolvedAsset>) {
    match value {
        serde_json::Value::String(s) => {
            for (placeholder, asset) in resolved {
                if s.contains(placeholder.as_str()) {
                    *s = s.replace(placeholder.as_str(), &asset.public_url);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                walk(item, resolved);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                walk(v, resolved);
            }
        }
        _ => {}
    }
}
