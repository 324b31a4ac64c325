//! Document version upgrades.
//!
//! Each step upgrades to exactly one version. Starting from the stored
//! version, every later step runs in order, so a version-0 document passes
//! through all of them.

use tessera_scene::{DOCUMENT_VERSION, Document, PropertyMap};

use crate::store::StoreError;

pub const CURRENT_DOCUMENT_VERSION: u32 = DOCUMENT_VERSION;

/// Returns true when the document was modified.
type Step = fn(&mut Document) -> bool;

const STEPS: [(u32, Step); 4] = [
    (1, to_version1),
    (2, to_version2),
    (3, to_version3),
    (4, to_version4),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeReport {
    pub from: u32,
    pub to: u32,
    pub changed: bool,
}

/// Bring `doc` up to [`CURRENT_DOCUMENT_VERSION`]. The version field is only
/// bumped when some step changed the document.
pub fn upgrade(doc: &mut Document) -> Result<UpgradeReport, StoreError> {
    let from = doc.version;
    if from > CURRENT_DOCUMENT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: from,
            supported: CURRENT_DOCUMENT_VERSION,
        });
    }

    let mut changed = false;
    for (target, step) in STEPS {
        if target > from {
            changed |= step(doc);
        }
    }
    if changed {
        doc.version = CURRENT_DOCUMENT_VERSION;
        tracing::info!(from, to = doc.version, "document upgraded");
    }
    Ok(UpgradeReport {
        from,
        to: doc.version,
        changed,
    })
}

/// Legacy property names: `_Rotation` style keys become camel case.
fn to_version1(doc: &mut Document) -> bool {
    for record in &mut doc.objects {
        let old = std::mem::take(&mut record.properties);
        record.properties = old
            .into_iter()
            .map(|(key, value)| (legacy_key(&key), value))
            .collect::<PropertyMap>();
    }
    true
}

fn to_version2(_doc: &mut Document) -> bool {
    false
}

fn to_version3(_doc: &mut Document) -> bool {
    false
}

fn to_version4(_doc: &mut Document) -> bool {
    false
}

fn legacy_key(key: &str) -> String {
    let renamed = key
        .replace("_Rotation", "quaternion")
        .replace("Use_Kerning", "kerning")
        .replace("Audio_Clip", "clip")
        .replace('_', "");
    let mut chars = renamed.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => renamed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::ObjectId;
    use tessera_scene::{ObjectRecord, Value};

    fn legacy_doc(version: u32) -> Document {
        let mut properties = PropertyMap::new();
        properties.insert("_Rotation".into(), Value::Quat([0.0, 0.0, 0.0, 1.0]));
        properties.insert("Position".into(), Value::Vec3([1.0, 2.0, 3.0]));
        properties.insert("Use_Kerning".into(), Value::Bool(true));
        properties.insert("Audio_Clip".into(), Value::Resource(None));
        Document {
            version,
            objects: vec![ObjectRecord {
                type_name: "Transform".into(),
                uuid: ObjectId::new(),
                parent: None,
                properties,
                extra: PropertyMap::new(),
            }],
        }
    }

    #[test]
    fn legacy_keys_are_renamed() {
        assert_eq!(legacy_key("_Rotation"), "quaternion");
        assert_eq!(legacy_key("Use_Kerning"), "kerning");
        assert_eq!(legacy_key("Audio_Clip"), "clip");
        assert_eq!(legacy_key("Cast_Shadows"), "castShadows");
        assert_eq!(legacy_key("position"), "position");
        assert_eq!(legacy_key(""), "");
    }

    #[test]
    fn version_zero_runs_every_step() {
        let mut doc = legacy_doc(0);
        let report = upgrade(&mut doc).unwrap();
        assert!(report.changed);
        assert_eq!(report.from, 0);
        assert_eq!(doc.version, CURRENT_DOCUMENT_VERSION);
        let keys: Vec<_> = doc.objects[0].properties.keys().cloned().collect();
        assert_eq!(keys, ["clip", "kerning", "position", "quaternion"]);
    }

    #[test]
    fn later_versions_skip_the_rename() {
        let mut doc = legacy_doc(1);
        let report = upgrade(&mut doc).unwrap();
        assert!(!report.changed);
        assert_eq!(doc.version, 1);
        assert!(doc.objects[0].properties.contains_key("_Rotation"));
    }

    #[test]
    fn future_version_is_unsupported() {
        let mut doc = legacy_doc(CURRENT_DOCUMENT_VERSION + 1);
        assert!(matches!(
            upgrade(&mut doc),
            Err(StoreError::UnsupportedVersion { .. })
        ));
    }
}
