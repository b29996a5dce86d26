use std::fs;
use std::path::{Path, PathBuf};

use env_logger::{Builder, Env};
use phenoscope::{load_data, load_data_with_format, DataFormat, LoadError};
use serde_json::{json, Value};
use serde_pickle::SerOptions;
use tempfile::{tempdir, TempDir};

// Initialize test logger
fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn")).try_init();
}

fn write_json(dir: &TempDir, name: &str, value: &Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
    path
}

fn write_pickle(dir: &TempDir, name: &str, value: &Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, serde_pickle::to_vec(value, SerOptions::new()).unwrap()).unwrap();
    path
}

/// Protocol 4 opcode writer for fixtures serde can't express: numpy leaves.
enum Node<'a> {
    Dict(Vec<(&'a str, Node<'a>)>),
    List(Vec<f64>),
    /// `np.array(values, dtype)` reduced through `numpy.core.multiarray._reconstruct`
    Reconstruct(&'a str, Vec<u8>, usize),
    /// `np.array(values, dtype)` written by protocol 5 through `numpy.core.numeric._frombuffer`
    FromBuffer(&'a str, Vec<u8>, usize),
}

fn text(out: &mut Vec<u8>, s: &str) {
    out.push(0x8c);
    out.push(s.len() as u8);
    out.extend_from_slice(s.as_bytes());
}

fn global(out: &mut Vec<u8>, module: &str, name: &str) {
    text(out, module);
    text(out, name);
    out.push(0x93);
}

fn dtype(out: &mut Vec<u8>, code: &str) {
    global(out, "numpy", "dtype");
    text(out, code);
    out.extend_from_slice(b"\x89\x88\x87R(K\x03");
    text(out, "<");
    out.extend_from_slice(b"NNNJ\xff\xff\xff\xffJ\xff\xff\xff\xffK\x00tb");
}

fn binbytes(out: &mut Vec<u8>, data: &[u8]) {
    out.push(b'B');
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}

fn encode(out: &mut Vec<u8>, node: &Node) {
    match node {
        Node::Dict(entries) => {
            out.extend_from_slice(b"}(");
            for (key, value) in entries {
                text(out, key);
                encode(out, value);
            }
            out.push(b'u');
        }
        Node::List(values) => {
            out.extend_from_slice(b"](");
            for value in values {
                out.push(b'G');
                out.extend_from_slice(&value.to_be_bytes());
            }
            out.push(b'e');
        }
        Node::Reconstruct(code, data, len) => {
            global(out, "numpy.core.multiarray", "_reconstruct");
            global(out, "numpy", "ndarray");
            out.extend_from_slice(b"K\x00\x85C\x01b\x87R(K\x01K");
            out.push(*len as u8);
            out.push(0x85);
            dtype(out, code);
            out.push(0x89);
            binbytes(out, data);
            out.extend_from_slice(b"tb");
        }
        Node::FromBuffer(code, data, len) => {
            global(out, "numpy.core.numeric", "_frombuffer");
            out.push(b'(');
            out.push(0x96);
            out.extend_from_slice(&(data.len() as u64).to_le_bytes());
            out.extend_from_slice(data);
            dtype(out, code);
            out.push(b'K');
            out.push(*len as u8);
            out.push(0x85);
            text(out, "C");
            out.extend_from_slice(b"tR");
        }
    }
}

fn write_numpy_pickle(dir: &TempDir, name: &str, root: &Node) -> PathBuf {
    let mut out = vec![0x80, 4];
    encode(&mut out, root);
    out.push(b'.');
    let path = dir.path().join(name);
    fs::write(&path, out).unwrap();
    path
}

fn f8(values: &[f64]) -> Node<'static> {
    let data = values.iter().flat_map(|x| x.to_le_bytes()).collect();
    Node::Reconstruct("f8", data, values.len())
}

fn two_by_two() -> Value {
    json!({
        "100": {
            "s1": { "img1": [1.0, 2.0, 3.0, 4.0] },
            "s2": { "img2": [1.5, 2.5, 3.5, 4.5] }
        },
        "200": {
            "s3": { "img3": [-1.0, 0.0, 1.0, 2.0] },
            "s4": { "img4": [0.5, 0.5, 0.5, 0.5] }
        }
    })
}

#[test]
fn test_two_syndromes_two_subjects() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempdir()?;
    let path = write_json(&dir, "data.json", &two_by_two());

    let dataset = load_data(&path)?;
    assert_eq!(dataset.features.dim(), (4, 4));
    assert_eq!(dataset.labels.to_vec(), vec!["100", "100", "200", "200"]);
    assert_eq!(dataset.n_classes(), 2);
    assert_eq!(dataset.features.row(2).to_vec(), vec![-1.0, 0.0, 1.0, 2.0]);
    Ok(())
}

#[test]
fn test_pickle_and_json_agree() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempdir()?;
    let data = two_by_two();
    let from_json = load_data(write_json(&dir, "data.json", &data))?;
    let from_pickle = load_data(write_pickle(&dir, "data.p", &data))?;

    assert_eq!(from_json, from_pickle);
    Ok(())
}

#[test]
fn test_integer_embeddings_in_pickle() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempdir()?;
    let data = json!({ "7": { "s": { "i": [1, 2, 3] } } });
    let dataset = load_data(write_pickle(&dir, "ints.pkl", &data))?;
    assert_eq!(dataset.features.row(0).to_vec(), vec![1.0, 2.0, 3.0]);
    Ok(())
}

#[test]
fn test_invalid_leaf_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempdir()?;
    let data = json!({
        "A": {
            "s1": { "i1": [0.1, 0.2], "i2": "corrupted", "i3": [0.3, 0.4] },
            "s2": 17
        },
        "B": "not a mapping",
        "C": { "s3": { "i4": [0.5, 0.6] } }
    });

    let dataset = load_data(write_json(&dir, "partial.json", &data))?;
    assert_eq!(dataset.features.dim(), (3, 2));
    assert_eq!(dataset.labels.to_vec(), vec!["A", "A", "C"]);
    Ok(())
}

#[test]
fn test_nonexistent_path() {
    init();
    let result = load_data(Path::new("/definitely/not/here.p"));
    assert!(matches!(result, Err(LoadError::NotFound(_))));
}

#[test]
fn test_top_level_not_mapping() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempdir()?;
    for (name, value) in [("string.json", json!("hello")), ("list.json", json!([[1.0, 2.0]]))] {
        let result = load_data(write_json(&dir, name, &value));
        assert!(matches!(result, Err(LoadError::MalformedTopLevel(_))), "{}", name);
    }
    Ok(())
}

#[test]
fn test_empty_and_all_invalid() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempdir()?;
    let result = load_data(write_json(&dir, "empty.json", &json!({})));
    assert!(matches!(result, Err(LoadError::Empty)));

    let result = load_data(write_pickle(&dir, "bad.p", &json!({ "A": { "s": { "i": "x" } } })));
    assert!(matches!(result, Err(LoadError::Empty)));
    Ok(())
}

#[test]
fn test_inconsistent_dimension() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempdir()?;
    let data = json!({ "A": { "s": { "i1": [1.0, 2.0], "i2": [1.0, 2.0, 3.0] } } });
    match load_data(write_json(&dir, "ragged.json", &data)) {
        Err(LoadError::InconsistentDimension { image, expected, found, .. }) => {
            assert_eq!(image, "i2");
            assert_eq!((expected, found), (2, 3));
        }
        other => panic!("expected InconsistentDimension, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_undecodable_file() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempdir()?;
    let path = dir.path().join("garbage.p");
    fs::write(&path, b"\xff\xfe not a pickle")?;
    assert!(matches!(load_data(&path), Err(LoadError::Deserialize { .. })));

    // Forcing the JSON decoder on a pickle fails the same way
    let pickle = write_pickle(&dir, "data.p", &two_by_two());
    assert!(matches!(
        load_data_with_format(&pickle, DataFormat::Json),
        Err(LoadError::Deserialize { .. })
    ));
    Ok(())
}

#[test]
fn test_numpy_leaves_are_embeddings() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempdir()?;
    let root = Node::Dict(vec![
        (
            "A",
            Node::Dict(vec![(
                "s1",
                Node::Dict(vec![("i1", f8(&[0.5, 1.5, 2.5])), ("i2", Node::List(vec![1.0, 2.0, 3.0]))]),
            )]),
        ),
        ("B", Node::Dict(vec![("s2", Node::Dict(vec![("i3", Node::List(vec![4.0, 5.0, 6.0]))]))])),
    ]);

    let dataset = load_data(write_numpy_pickle(&dir, "mixed.p", &root))?;
    assert_eq!(dataset.features.dim(), (3, 3));
    assert_eq!(dataset.labels.to_vec(), vec!["A", "A", "B"]);
    assert_eq!(dataset.features.row(0).to_vec(), vec![0.5, 1.5, 2.5]);
    Ok(())
}

#[test]
fn test_only_numpy_leaves() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempdir()?;
    let float32: Vec<u8> = [0.25f32, -0.5].iter().flat_map(|x| x.to_le_bytes()).collect();
    let root = Node::Dict(vec![
        ("300000034", Node::Dict(vec![("s1", Node::Dict(vec![("i1", f8(&[1.0, 2.0]))]))])),
        (
            "100180",
            Node::Dict(vec![("s2", Node::Dict(vec![("i2", Node::FromBuffer("f4", float32, 2))]))]),
        ),
    ]);

    let dataset = load_data(write_numpy_pickle(&dir, "arrays.pkl", &root))?;
    // Insertion order, not sorted order
    assert_eq!(dataset.labels.to_vec(), vec!["300000034", "100180"]);
    assert_eq!(dataset.features.row(0).to_vec(), vec![1.0, 2.0]);
    assert_eq!(dataset.features.row(1).to_vec(), vec![0.25, -0.5]);
    Ok(())
}

#[test]
fn test_unsupported_numpy_dtype_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempdir()?;
    let root = Node::Dict(vec![(
        "A",
        Node::Dict(vec![("s", Node::Dict(vec![("i", Node::Reconstruct("c16", vec![0; 16], 1))]))]),
    )]);

    match load_data(write_numpy_pickle(&dir, "complex.p", &root)) {
        Err(LoadError::Deserialize { message, .. }) => assert!(message.contains("c16"), "{}", message),
        other => panic!("expected Deserialize, got {:?}", other),
    }
    Ok(())
}
