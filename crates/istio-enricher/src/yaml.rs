//! Reading and writing a [`ResourceGraph`] as a stream of YAML documents.
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::graph::{ResourceGraph, ResourceNode};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Represents every error which can be encountered during YAML (de)serialization.
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to deserialize YAML document {index}"))]
    DeserializeDocument {
        source: serde_yaml::Error,
        index: usize,
    },

    #[snafu(display("failed to serialize YAML"))]
    SerializeYaml { source: serde_yaml::Error },

    #[snafu(display("failed to write YAML document separator"))]
    WriteDocumentSeparator { source: std::io::Error },
}

/// Reads every document of a multi-document YAML stream as one top-level node.
///
/// Documents whose `apiVersion` and `kind` match a typed node become typed nodes, everything else
/// is kept as [`ResourceNode::Unstructured`]. Empty documents are skipped.
pub fn read_graph(reader: impl Read) -> Result<ResourceGraph> {
    serde_yaml::Deserializer::from_reader(reader)
        .enumerate()
        .filter_map(|(index, document)| {
            match ResourceNode::deserialize(document).context(DeserializeDocumentSnafu { index }) {
                Ok(ResourceNode::Unstructured(serde_json::Value::Null)) => None,
                node => Some(node),
            }
        })
        .collect()
}

/// Writes every top-level node as its own document, each one introduced by `---`.
pub fn write_graph(graph: &ResourceGraph, mut writer: impl Write) -> Result<()> {
    for node in graph.nodes() {
        serialize(node, &mut writer)?;
    }

    Ok(())
}

/// Serializes the given data structure as an explicit document and writes it to a
/// [`Writer`](Write).
pub fn serialize<T, W>(value: &T, mut writer: W) -> Result<()>
where
    T: Serialize,
    W: Write,
{
    writer
        .write_all(b"---\n")
        .context(WriteDocumentSeparatorSnafu)?;

    let mut serializer = serde_yaml::Serializer::new(writer);
    value
        .serialize(&mut serializer)
        .context(SerializeYamlSnafu)
}
