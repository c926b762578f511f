//! Canonical JSON rendering.
//!
//! Audit lines and config hashes both need a byte-stable rendering of a
//! JSON document: object keys in lexicographic order, compact separators,
//! no trailing whitespace. Rather than rebuilding a key-sorted value tree
//! and re-serializing it, this walks the document once and streams the
//! canonical form into a single buffer; scalars and strings delegate to
//! `serde_json` so escaping and number formatting stay identical to the
//! regular serializer.

use serde::Serialize;
use serde_json::Value;

/// Render any serializable value as canonical compact JSON.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let tree = serde_json::to_value(value)?;
    let mut out = String::new();
    write_canonical(&tree, &mut out);
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            // Key order must not depend on the map backing serde_json was
            // built with, so sort explicitly here.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, child)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("keys always serialize"));
                out.push(':');
                write_canonical(child, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, child) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(child, out);
            }
            out.push(']');
        }
        scalar => {
            out.push_str(&serde_json::to_string(scalar).expect("scalars always serialize"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_come_out_sorted_at_every_depth() {
        let v = json!({"b": {"z": 1, "a": 2}, "a": [{"y": 0, "x": 0}]});
        assert_eq!(
            canonical_json(&v).unwrap(),
            r#"{"a":[{"x":0,"y":0}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn output_is_compact_and_stable() {
        let v = json!({"s": "a \"quoted\" string", "n": 1.5, "flag": true, "none": null});
        let first = canonical_json(&v).unwrap();
        let second = canonical_json(&v).unwrap();
        assert_eq!(first, second);
        assert!(!first.contains(' '), "no separators outside strings: {first}");
        assert!(first.contains(r#""s":"a \"quoted\" string""#));
    }

    #[test]
    fn agrees_with_serde_for_already_sorted_input() {
        let v = json!({"a": 1, "b": [1, 2, 3], "c": "x"});
        assert_eq!(canonical_json(&v).unwrap(), serde_json::to_string(&v).unwrap());
    }

    #[test]
    fn works_on_arbitrary_serialize_types() {
        #[derive(serde::Serialize)]
        struct Probe {
            zeta: u32,
            alpha: &'static str,
        }
        let s = canonical_json(&Probe { zeta: 9, alpha: "first" }).unwrap();
        assert_eq!(s, r#"{"alpha":"first","zeta":9}"#);
    }
}
