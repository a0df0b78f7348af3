//! Per-job copy of the engine's tactics document.
//!
//! The base document is read once at startup. Before each run the parameter
//! list is written into `<section>.<field>` and the result saved to a single
//! output path that every job reuses.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::JobError;
use crate::utils::{PtElement, TacticsConfig};

#[derive(Debug, Clone)]
pub struct TacticsFile {
    base: Map<String, Value>,
    section: String,
    field: String,
    output_path: PathBuf,
}

impl TacticsFile {
    pub fn load(config: &TacticsConfig) -> Result<Self, JobError> {
        let raw = std::fs::read(&config.base_path)
            .map_err(|e| JobError::filesystem("read", &config.base_path, e))?;
        let document: Value = serde_json::from_slice(&raw).map_err(|e| JobError::Tactics {
            path: config.base_path.clone(),
            reason: e.to_string(),
        })?;
        Self::from_document(document, config)
    }

    pub fn from_document(document: Value, config: &TacticsConfig) -> Result<Self, JobError> {
        let invalid = |reason: String| JobError::Tactics {
            path: config.base_path.clone(),
            reason,
        };
        let Value::Object(base) = document else {
            return Err(invalid("top level is not an object".to_string()));
        };
        match base.get(&config.section) {
            Some(Value::Object(_)) => {}
            Some(_) => return Err(invalid(format!("{:?} is not an object", config.section))),
            None => return Err(invalid(format!("missing {:?} section", config.section))),
        }
        Ok(TacticsFile {
            base,
            section: config.section.clone(),
            field: config.field.clone(),
            output_path: config.output_path.clone(),
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Base document with only the parameter field replaced.
    pub fn render(&self, pt_list: &[f64], element: PtElement) -> Value {
        let values = pt_list
            .iter()
            .map(|pt| element.to_json(*pt))
            .collect::<Vec<_>>();

        let mut document = self.base.clone();
        if let Some(Value::Object(section)) = document.get_mut(&self.section) {
            section.insert(self.field.clone(), Value::Array(values));
        }
        Value::Object(document)
    }

    pub async fn write_for(&self, job_id: &str, pt_list: &[f64], element: PtElement) -> Result<(), JobError> {
        let rendered = serde_json::to_vec(&self.render(pt_list, element)).map_err(|e| JobError::Tactics {
            path: self.output_path.clone(),
            reason: e.to_string(),
        })?;
        tokio::fs::write(&self.output_path, rendered)
            .await
            .map_err(|e| JobError::filesystem("write", &self.output_path, e))?;
        debug!(job_id, path = %self.output_path.display(), "tactics written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(dir: &Path) -> TacticsConfig {
        TacticsConfig {
            base_path: dir.join("tactics.json"),
            output_path: dir.join("tactics-mod.json"),
            section: "tactics".to_string(),
            field: "jun_pt".to_string(),
        }
    }

    fn base() -> Value {
        json!({
            "tactics": {
                "jun_pt": [90, 45, 0, -135],
                "use_yama": true
            },
            "version": 3
        })
    }

    #[test]
    fn test_render_replaces_only_the_parameter_field() {
        let dir = tempfile::tempdir().unwrap();
        let tactics = TacticsFile::from_document(base(), &config(dir.path())).unwrap();

        let rendered = tactics.render(&[80.0, 40.0, 0.0, -120.0], PtElement::Integer);
        assert_eq!(
            rendered,
            json!({
                "tactics": {
                    "jun_pt": [80, 40, 0, -120],
                    "use_yama": true
                },
                "version": 3
            })
        );

        let rendered = tactics.render(&[80.5, -80.5], PtElement::Float);
        assert_eq!(rendered["tactics"]["jun_pt"], json!([80.5, -80.5]));

        // the base is not mutated between jobs
        let rendered = tactics.render(&[], PtElement::Integer);
        assert_eq!(rendered["tactics"]["jun_pt"], json!([]));
    }

    #[test]
    fn test_missing_section_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = TacticsFile::from_document(json!({"version": 3}), &config(dir.path())).unwrap_err();
        assert!(matches!(err, JobError::Tactics { .. }));

        let err = TacticsFile::from_document(json!({"tactics": [1]}), &config(dir.path())).unwrap_err();
        assert!(matches!(err, JobError::Tactics { .. }));

        let err = TacticsFile::from_document(json!([1, 2]), &config(dir.path())).unwrap_err();
        assert!(matches!(err, JobError::Tactics { .. }));
    }

    #[tokio::test]
    async fn test_load_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        std::fs::write(&config.base_path, serde_json::to_vec(&base()).unwrap()).unwrap();

        let tactics = TacticsFile::load(&config).unwrap();
        tactics.write_for("t1", &[10.0, 5.0, -5.0, -10.0], PtElement::Integer).await.unwrap();

        let written: Value = serde_json::from_slice(&std::fs::read(&config.output_path).unwrap()).unwrap();
        assert_eq!(written["tactics"]["jun_pt"], json!([10, 5, -5, -10]));
        assert_eq!(written["tactics"]["use_yama"], json!(true));
    }

    #[test]
    fn test_load_missing_base_is_filesystem_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TacticsFile::load(&config(dir.path())).unwrap_err();
        assert!(matches!(err, JobError::Filesystem { action: "read", .. }));
    }
}
