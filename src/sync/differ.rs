//! Minimal diffs between object trees.
//!
//! A transition from tree `A` to tree `B` is expressed as a delete mask
//! plus a sync overlay, computed independently:
//!
//! `apply_sync(apply_delete(A, get_delete(A, B)), get_sync(A, B)) == B`

use crate::sync::value::{Value, ValueMap};

/// Computes the overlay of entries that must be written to turn `old`
/// into `new`. Maps on both sides recurse; everything else is replaced
/// wholesale when unequal.
pub fn get_sync(old: &ValueMap, new: &ValueMap) -> ValueMap {
    let mut out = ValueMap::new();
    for (key, new_value) in new {
        match (old.get(key), new_value) {
            (Some(Value::Map(old_map)), Value::Map(new_map)) => {
                let nested = get_sync(old_map, new_map);
                if !nested.is_empty() {
                    out.insert(key.clone(), Value::Map(nested));
                }
            }
            (Some(old_value), _) if old_value == new_value => {}
            _ => {
                out.insert(key.clone(), new_value.clone());
            }
        }
    }
    out
}

/// Computes the mask of entries that must be removed to turn `old` into
/// `new`. A `true` leaf deletes the whole subtree at that key.
pub fn get_delete(old: &ValueMap, new: &ValueMap) -> ValueMap {
    let mut out = ValueMap::new();
    for (key, old_value) in old {
        match new.get(key) {
            None => {
                out.insert(key.clone(), Value::Bool(true));
            }
            Some(Value::Map(new_map)) => {
                if let Value::Map(old_map) = old_value {
                    let nested = get_delete(old_map, new_map);
                    if !nested.is_empty() {
                        out.insert(key.clone(), Value::Map(nested));
                    }
                }
            }
            Some(_) => {}
        }
    }
    out
}

/// Overlays `sync` onto `base`. Maps merge recursively; any other
/// collision replaces the base entry.
pub fn apply_sync(base: &ValueMap, sync: &ValueMap) -> ValueMap {
    let mut out = base.clone();
    for (key, sync_value) in sync {
        let merged = match (base.get(key), sync_value) {
            (Some(Value::Map(base_map)), Value::Map(sync_map)) => {
                Value::Map(apply_sync(base_map, sync_map))
            }
            (_, value) => value.clone(),
        };
        out.insert(key.clone(), merged);
    }
    out
}

/// Removes from `base` every entry the mask marks with a `true` leaf,
/// recursing where the mask holds a map.
pub fn apply_delete(base: &ValueMap, mask: &ValueMap) -> ValueMap {
    let mut out = ValueMap::new();
    for (key, value) in base {
        match (mask.get(key), value) {
            (Some(Value::Bool(true)), _) => {}
            (Some(Value::Map(mask_map)), Value::Map(base_map)) => {
                out.insert(key.clone(), Value::Map(apply_delete(base_map, mask_map)));
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! tree {
        ($($key:literal => $value:expr),* $(,)?) => {{
            #[allow(unused_mut)]
            let mut map = ValueMap::new();
            $(map.insert($key.to_string(), Value::from($value));)*
            map
        }};
    }

    fn start() -> ValueMap {
        tree! {
            "a" => 1i64,
            "b" => "asd",
            "c" => tree! {
                "a" => 2i64,
                "b" => "dfg",
                "c" => tree! { "test" => 123i64 },
            },
            "d" => tree! {
                "a" => 2i64,
                "b" => "dfg",
                "c" => tree! { "test" => 123i64 },
            },
        }
    }

    fn end() -> ValueMap {
        tree! {
            "a" => 1i64,
            "c" => tree! {
                "b" => "asd",
                "e" => false,
                "d" => tree! {
                    "a" => 2i64,
                    "b" => "uhg",
                    "c" => tree! { "a" => true },
                },
            },
            "e" => "asdfg",
        }
    }

    fn delete_mask() -> ValueMap {
        tree! {
            "b" => true,
            "c" => tree! { "a" => true, "c" => true },
            "d" => true,
        }
    }

    fn sync_overlay() -> ValueMap {
        tree! {
            "e" => "asdfg",
            "c" => tree! {
                "e" => false,
                "b" => "asd",
                "d" => tree! {
                    "a" => 2i64,
                    "b" => "uhg",
                    "c" => tree! { "a" => true },
                },
            },
        }
    }

    #[test]
    fn get_delete_marks_removed_subtrees() {
        assert_eq!(get_delete(&start(), &end()), delete_mask());
    }

    #[test]
    fn get_sync_collects_changed_entries() {
        assert_eq!(get_sync(&start(), &end()), sync_overlay());
    }

    #[test]
    fn apply_delete_prunes_masked_entries() {
        let expected = tree! {
            "a" => 1i64,
            "c" => tree! { "b" => "dfg" },
        };
        assert_eq!(apply_delete(&start(), &delete_mask()), expected);
    }

    #[test]
    fn apply_sync_overlays_changes() {
        let expected = tree! {
            "a" => 1i64,
            "b" => "asd",
            "c" => tree! {
                "a" => 2i64,
                "b" => "asd",
                "c" => tree! { "test" => 123i64 },
                "d" => tree! {
                    "a" => 2i64,
                    "b" => "uhg",
                    "c" => tree! { "a" => true },
                },
                "e" => false,
            },
            "d" => tree! {
                "a" => 2i64,
                "b" => "dfg",
                "c" => tree! { "test" => 123i64 },
            },
            "e" => "asdfg",
        };
        assert_eq!(apply_sync(&start(), &sync_overlay()), expected);
    }

    #[test]
    fn sync_from_empty_is_the_target() {
        assert_eq!(get_sync(&ValueMap::new(), &end()), end());
        assert_eq!(apply_sync(&ValueMap::new(), &end()), end());
    }

    #[test]
    fn delete_to_empty_marks_everything() {
        let expected = tree! {
            "a" => true,
            "b" => true,
            "c" => true,
            "d" => true,
        };
        assert_eq!(get_delete(&start(), &ValueMap::new()), expected);
    }

    #[test]
    fn delete_then_sync_reaches_the_target() {
        let pruned = apply_delete(&start(), &get_delete(&start(), &end()));
        assert_eq!(apply_sync(&pruned, &get_sync(&start(), &end())), end());
    }
}
