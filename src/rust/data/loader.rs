use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use ndarray::{Array1, Array2};
use super::error::LoadError;
use super::nested::NestedValue;
use super::pickle;
use super::EmbeddingDataset;

/// Serialization formats the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// Python pickle of dicts, lists, tuples, numbers and numpy arrays.
    ///
    /// Dict keys are traversed in the order the writer inserted them, so rows come out
    /// in the same order Python iterates the object.
    Pickle,
    /// JSON document; object key order is kept
    Json,
}

impl DataFormat {
    /// Picks the format from the file extension. Anything that is not `.json` is read as a pickle.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Self::Json,
            _ => Self::Pickle,
        }
    }
}

/// Outcome of inspecting one level of the nested document.
enum Entry<T> {
    Valid(T),
    Skip(String),
}

fn mapping<V: NestedValue>(value: &V) -> Entry<Vec<(String, &V)>> {
    match value.entries() {
        Some(entries) => Entry::Valid(entries),
        None => Entry::Skip(format!("expected a mapping, found {}", value.kind())),
    }
}

fn embedding<V: NestedValue>(value: &V) -> Entry<Vec<f64>> {
    match value.numbers() {
        Some(values) if values.is_empty() => Entry::Skip("embedding is empty".to_string()),
        Some(values) => Entry::Valid(values),
        None => Entry::Skip(format!("expected a sequence of numbers, found {}", value.kind())),
    }
}

/// Loads the `syndrome -> subject -> image -> embedding` file at `path`.
///
/// The format is chosen from the extension, see [`DataFormat::from_path`].
///
/// # Errors
/// * [`LoadError::NotFound`] if the path does not exist (nothing is read)
/// * [`LoadError::Io`] / [`LoadError::Deserialize`] if the file cannot be decoded
/// * [`LoadError::MalformedTopLevel`] if the document is not a mapping
/// * [`LoadError::Empty`] if no valid embedding was found
/// * [`LoadError::InconsistentDimension`] if embeddings differ in length
///
/// # Example
/// ```no_run
/// use phenoscope::load_data;
///
/// let dataset = load_data("mini_gm_public_v0.1.p")?;
/// println!("{} samples, {} features", dataset.n_samples(), dataset.n_features());
/// # Ok::<(), phenoscope::LoadError>(())
/// ```
pub fn load_data<P: AsRef<Path>>(path: P) -> Result<EmbeddingDataset, LoadError> {
    let path = path.as_ref();
    load_data_with_format(path, DataFormat::from_path(path))
}

/// Same as [`load_data`] with an explicit format.
pub fn load_data_with_format<P: AsRef<Path>>(
    path: P,
    format: DataFormat,
) -> Result<EmbeddingDataset, LoadError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    let result = read_and_flatten(path, format);
    match &result {
        Ok(dataset) => {
            info!(
                "Data loaded successfully: {} samples, {} features",
                dataset.n_samples(),
                dataset.n_features()
            );
            info!("Number of unique classes: {}", dataset.n_classes());
        }
        Err(e) => error!("Failed to load data: {}", e),
    }
    result
}

fn read_and_flatten(path: &Path, format: DataFormat) -> Result<EmbeddingDataset, LoadError> {
    info!("Loading data from: {}", path.display());
    let io_error = |source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    };

    match format {
        DataFormat::Pickle => {
            let bytes = fs::read(path).map_err(io_error)?;
            let value = pickle::from_slice(&bytes).map_err(|e| deserialize_error(path, e))?;
            flatten(&value)
        }
        DataFormat::Json => {
            let reader = BufReader::new(File::open(path).map_err(io_error)?);
            let value: serde_json::Value =
                serde_json::from_reader(reader).map_err(|e| deserialize_error(path, e))?;
            flatten(&value)
        }
    }
}

fn deserialize_error(path: &Path, e: impl std::fmt::Display) -> LoadError {
    LoadError::Deserialize {
        path: PathBuf::from(path),
        message: e.to_string(),
    }
}

/// Flattens an already decoded document into parallel features and labels.
///
/// Entries of the wrong shape below the top level are skipped with a warning.
pub fn flatten<V: NestedValue>(root: &V) -> Result<EmbeddingDataset, LoadError> {
    let syndromes = match mapping(root) {
        Entry::Valid(entries) => entries,
        Entry::Skip(_) => {
            return Err(LoadError::MalformedTopLevel(format!(
                "the file must contain a mapping of syndromes, found {}",
                root.kind()
            )))
        }
    };

    let mut values: Vec<f64> = Vec::new();
    let mut labels: Vec<String> = Vec::new();
    let mut dimension: Option<usize> = None;

    for (syndrome_id, subjects) in syndromes {
        let subjects = match mapping(subjects) {
            Entry::Valid(entries) => entries,
            Entry::Skip(reason) => {
                warn!("Invalid format for syndrome {}: {}", syndrome_id, reason);
                continue;
            }
        };

        for (subject_id, images) in subjects {
            let images = match mapping(images) {
                Entry::Valid(entries) => entries,
                Entry::Skip(reason) => {
                    warn!("Invalid format for subject {}: {}", subject_id, reason);
                    continue;
                }
            };

            for (image_id, value) in images {
                let vector = match embedding(value) {
                    Entry::Valid(vector) => vector,
                    Entry::Skip(reason) => {
                        warn!("Invalid embedding for image {}: {}", image_id, reason);
                        continue;
                    }
                };

                let expected = *dimension.get_or_insert(vector.len());
                if vector.len() != expected {
                    return Err(LoadError::InconsistentDimension {
                        syndrome: syndrome_id,
                        subject: subject_id,
                        image: image_id,
                        expected,
                        found: vector.len(),
                    });
                }

                values.extend(vector);
                labels.push(syndrome_id.clone());
            }
        }
    }

    let dimension = match dimension {
        Some(d) if !labels.is_empty() => d,
        _ => return Err(LoadError::Empty),
    };

    let features = Array2::from_shape_vec((labels.len(), dimension), values)?;
    Ok(EmbeddingDataset::new(features, Array1::from(labels)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DataFormat::from_path(Path::new("data.json")), DataFormat::Json);
        assert_eq!(DataFormat::from_path(Path::new("DATA.JSON")), DataFormat::Json);
        assert_eq!(DataFormat::from_path(Path::new("mini_gm_public_v0.1.p")), DataFormat::Pickle);
        assert_eq!(DataFormat::from_path(Path::new("data.pkl")), DataFormat::Pickle);
        assert_eq!(DataFormat::from_path(Path::new("no_extension")), DataFormat::Pickle);
    }

    #[test]
    fn test_flatten_keeps_traversal_order() {
        let value = json!({
            "syndrome_1": {
                "subject_1": {"image_1": [1, 2, 3], "image_2": [4, 5, 6]},
                "subject_2": {"image_1": [7, 8, 9]}
            },
            "syndrome_2": {
                "subject_3": {"image_1": [10, 11, 12]}
            }
        });

        let dataset = flatten(&value).unwrap();
        assert_eq!(dataset.features.dim(), (4, 3));
        assert_eq!(
            dataset.labels.to_vec(),
            vec!["syndrome_1", "syndrome_1", "syndrome_1", "syndrome_2"]
        );
        assert_eq!(dataset.features[[2, 0]], 7.0);
        assert_eq!(dataset.features[[3, 2]], 12.0);
    }

    #[test]
    fn test_flatten_skips_malformed_levels() {
        let value = json!({
            "bad_syndrome": [1, 2, 3],
            "syndrome_1": {
                "bad_subject": "oops",
                "subject_1": {
                    "image_1": "not_a_list",
                    "image_2": [1, 2],
                    "image_3": [],
                    "image_4": [1, null]
                }
            }
        });

        let dataset = flatten(&value).unwrap();
        assert_eq!(dataset.n_samples(), 1);
        assert_eq!(dataset.n_features(), 2);
        assert_eq!(dataset.labels[0], "syndrome_1");
    }

    #[test]
    fn test_flatten_rejects_non_mapping_top_level() {
        let err = flatten(&json!("invalid data")).unwrap_err();
        assert!(matches!(err, LoadError::MalformedTopLevel(_)));
        assert!(err.to_string().contains("string"));

        let err = flatten(&json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, LoadError::MalformedTopLevel(_)));
    }

    #[test]
    fn test_flatten_empty_mapping() {
        let err = flatten(&json!({})).unwrap_err();
        assert!(matches!(err, LoadError::Empty));
        assert_eq!(err.to_string(), "no valid data found in file");
    }

    #[test]
    fn test_flatten_only_invalid_leaves_is_empty() {
        let value = json!({"s": {"subj": {"img": "nope"}}});
        assert!(matches!(flatten(&value), Err(LoadError::Empty)));
    }

    #[test]
    fn test_flatten_inconsistent_dimension() {
        let value = json!({
            "s1": {"a": {"i1": [1, 2, 3]}},
            "s2": {"b": {"i2": [1, 2]}}
        });

        match flatten(&value) {
            Err(LoadError::InconsistentDimension { syndrome, image, expected, found, .. }) => {
                assert_eq!(syndrome, "s2");
                assert_eq!(image, "i2");
                assert_eq!(expected, 3);
                assert_eq!(found, 2);
            }
            other => panic!("expected InconsistentDimension, got {:?}", other),
        }
    }
}
