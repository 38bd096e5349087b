// This module implements the generic lowered artifact: an ordered list of records (input
// bindings, operators, output bindings) accumulated by ArtifactBuilder while the graph is
// walked, a compact little-endian binary encoding of that list, a decoder for the same
// encoding, and a serde-rendered JSON descriptor written next to debug dumps. The encoding
// only depends on the record list, so lowering the same graph twice yields identical bytes.

//! Generic lowered artifact.
//!
//! Binary layout (all integers little-endian):
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ Magic: "GLIR" (4 bytes)             │
//! │ Version: u16, reserved: u16         │
//! │ Record count: u32                   │
//! ├─────────────────────────────────────┤
//! │ Record: tag u8, length u32, payload │
//! │ ...                                 │
//! └─────────────────────────────────────┘
//! ```
//!
//! Strings are a u32 length followed by UTF-8 bytes; lists are a u32 count
//! followed by their items.

use serde::Serialize;

use crate::core::{DelegateError, DelegateResult};
use crate::graph::{DType, InputKind, TensorMeta};

/// Magic bytes identifying a lowered artifact.
pub const MAGIC: &[u8; 4] = b"GLIR";

/// Current artifact format version.
pub const VERSION: u16 = 1;

const TAG_INPUT: u8 = 1;
const TAG_OPERATOR: u8 = 2;
const TAG_OUTPUT: u8 = 3;

/// Tag byte plus u32 payload length.
const RECORD_HEADER_LEN: usize = 5;

const ATTR_INT: u8 = 0;
const ATTR_FLOAT: u8 = 1;
const ATTR_INTS: u8 = 2;
const ATTR_STR: u8 = 3;

/// Named tensor with layout information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorDesc {
    pub name: String,
    pub dtype: DType,
    pub shape: Vec<u64>,
    /// Physical dimension order; empty means contiguous in logical order.
    pub dim_order: Vec<u32>,
}

impl TensorDesc {
    pub fn new(name: impl Into<String>, meta: &TensorMeta) -> Self {
        Self {
            name: name.into(),
            dtype: meta.dtype,
            shape: meta.shape.clone(),
            dim_order: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Ints(Vec<i64>),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub value: AttrValue,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: AttrValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One entry of the artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum Record {
    /// Binds a program input, parameter, buffer or constant.
    Input {
        index: u32,
        kind: InputKind,
        tensor: TensorDesc,
    },
    /// A generic tensor operator.
    Operator {
        op: String,
        inputs: Vec<String>,
        outputs: Vec<TensorDesc>,
        attributes: Vec<Attribute>,
    },
    /// Binds the partition outputs.
    Output { names: Vec<String> },
}

impl Record {
    fn tag(&self) -> u8 {
        match self {
            Record::Input { .. } => TAG_INPUT,
            Record::Operator { .. } => TAG_OPERATOR,
            Record::Output { .. } => TAG_OUTPUT,
        }
    }

    /// Short kind name used in logs and diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Record::Input { .. } => "input",
            Record::Operator { .. } => "operator",
            Record::Output { .. } => "output",
        }
    }
}

/// Accumulates records while a graph is lowered.
#[derive(Debug, Clone, Default)]
pub struct ArtifactBuilder {
    records: Vec<Record>,
}

impl ArtifactBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, index: u32, kind: InputKind, tensor: TensorDesc) {
        self.records.push(Record::Input {
            index,
            kind,
            tensor,
        });
    }

    pub fn add_operator(
        &mut self,
        op: impl Into<String>,
        inputs: Vec<String>,
        outputs: Vec<TensorDesc>,
        attributes: Vec<Attribute>,
    ) {
        self.records.push(Record::Operator {
            op: op.into(),
            inputs,
            outputs,
            attributes,
        });
    }

    pub fn add_output(&mut self, names: Vec<String>) {
        self.records.push(Record::Output { names });
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Encode the records in the binary artifact format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + self.records.len() * 32);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        put_u32(&mut out, self.records.len() as u32);

        for record in &self.records {
            let mut payload = Vec::new();
            encode_record(&mut payload, record);
            out.push(record.tag());
            put_u32(&mut out, payload.len() as u32);
            out.extend_from_slice(&payload);
        }
        out
    }

    /// Human-readable descriptor of the records.
    pub fn descriptor(&self) -> ArtifactDescriptor<'_> {
        ArtifactDescriptor {
            version: VERSION,
            records: &self.records,
        }
    }
}

/// JSON descriptor written alongside a dumped artifact.
#[derive(Debug, Serialize)]
pub struct ArtifactDescriptor<'a> {
    pub version: u16,
    pub records: &'a [Record],
}

impl ArtifactDescriptor<'_> {
    pub fn to_json(&self) -> DelegateResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A decoded artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub version: u16,
    pub records: Vec<Record>,
}

impl Artifact {
    /// Decode bytes produced by [`ArtifactBuilder::serialize`].
    pub fn decode(bytes: &[u8]) -> DelegateResult<Self> {
        let mut reader = Reader::new(bytes);
        if reader.take(4)? != MAGIC {
            return Err(malformed("bad magic"));
        }
        let version = reader.u16()?;
        if version != VERSION {
            return Err(malformed(format!("unsupported version {version}")));
        }
        reader.u16()?;
        let count = reader.u32()?;

        // Every record needs at least its tag and length, so a count beyond
        // what the remaining bytes can hold is rejected in the loop below.
        let capacity = (count as usize).min(reader.remaining() / RECORD_HEADER_LEN);
        let mut records = Vec::with_capacity(capacity);
        for _ in 0..count {
            let tag = reader.u8()?;
            let len = reader.u32()? as usize;
            let mut payload = Reader::new(reader.take(len)?);
            records.push(decode_record(tag, &mut payload)?);
            if !payload.is_empty() {
                return Err(malformed("trailing bytes in record"));
            }
        }
        if !reader.is_empty() {
            return Err(malformed("trailing bytes after last record"));
        }

        Ok(Self { version, records })
    }
}

fn malformed(reason: impl Into<String>) -> DelegateError {
    DelegateError::MalformedArtifact {
        reason: reason.into(),
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, value: &str) {
    put_u32(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

fn put_strs(out: &mut Vec<u8>, values: &[String]) {
    put_u32(out, values.len() as u32);
    for value in values {
        put_str(out, value);
    }
}

fn put_tensor(out: &mut Vec<u8>, tensor: &TensorDesc) {
    put_str(out, &tensor.name);
    out.push(tensor.dtype.tag());
    put_u32(out, tensor.shape.len() as u32);
    for dim in &tensor.shape {
        out.extend_from_slice(&dim.to_le_bytes());
    }
    put_u32(out, tensor.dim_order.len() as u32);
    for dim in &tensor.dim_order {
        put_u32(out, *dim);
    }
}

fn put_attribute(out: &mut Vec<u8>, attr: &Attribute) {
    put_str(out, &attr.name);
    match &attr.value {
        AttrValue::Int(v) => {
            out.push(ATTR_INT);
            out.extend_from_slice(&v.to_le_bytes());
        }
        AttrValue::Float(v) => {
            out.push(ATTR_FLOAT);
            out.extend_from_slice(&v.to_bits().to_le_bytes());
        }
        AttrValue::Ints(values) => {
            out.push(ATTR_INTS);
            put_u32(out, values.len() as u32);
            for v in values {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        AttrValue::Str(s) => {
            out.push(ATTR_STR);
            put_str(out, s);
        }
    }
}

fn encode_record(out: &mut Vec<u8>, record: &Record) {
    match record {
        Record::Input {
            index,
            kind,
            tensor,
        } => {
            put_u32(out, *index);
            out.push(kind.tag());
            put_tensor(out, tensor);
        }
        Record::Operator {
            op,
            inputs,
            outputs,
            attributes,
        } => {
            put_str(out, op);
            put_strs(out, inputs);
            put_u32(out, outputs.len() as u32);
            for tensor in outputs {
                put_tensor(out, tensor);
            }
            put_u32(out, attributes.len() as u32);
            for attr in attributes {
                put_attribute(out, attr);
            }
        }
        Record::Output { names } => put_strs(out, names),
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos == self.bytes.len()
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> DelegateResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| malformed(format!("truncated at offset {}", self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> DelegateResult<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u8(&mut self) -> DelegateResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> DelegateResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> DelegateResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> DelegateResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> DelegateResult<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn string(&mut self) -> DelegateResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| malformed("string is not UTF-8"))
    }

    fn strings(&mut self) -> DelegateResult<Vec<String>> {
        let count = self.u32()?;
        (0..count).map(|_| self.string()).collect()
    }

    fn tensor(&mut self) -> DelegateResult<TensorDesc> {
        let name = self.string()?;
        let dtype_tag = self.u8()?;
        let dtype = DType::from_tag(dtype_tag)
            .ok_or_else(|| malformed(format!("unknown dtype tag {dtype_tag}")))?;
        let rank = self.u32()?;
        let shape = (0..rank).map(|_| self.u64()).collect::<DelegateResult<_>>()?;
        let order_len = self.u32()?;
        let dim_order = (0..order_len)
            .map(|_| self.u32())
            .collect::<DelegateResult<_>>()?;
        Ok(TensorDesc {
            name,
            dtype,
            shape,
            dim_order,
        })
    }

    fn attribute(&mut self) -> DelegateResult<Attribute> {
        let name = self.string()?;
        let value = match self.u8()? {
            ATTR_INT => AttrValue::Int(self.i64()?),
            ATTR_FLOAT => AttrValue::Float(f64::from_bits(self.u64()?)),
            ATTR_INTS => {
                let count = self.u32()?;
                AttrValue::Ints((0..count).map(|_| self.i64()).collect::<DelegateResult<_>>()?)
            }
            ATTR_STR => AttrValue::Str(self.string()?),
            other => return Err(malformed(format!("unknown attribute tag {other}"))),
        };
        Ok(Attribute { name, value })
    }
}

fn decode_record(tag: u8, reader: &mut Reader<'_>) -> DelegateResult<Record> {
    match tag {
        TAG_INPUT => {
            let index = reader.u32()?;
            let kind_tag = reader.u8()?;
            let kind = InputKind::from_tag(kind_tag)
                .ok_or_else(|| malformed(format!("unknown input kind {kind_tag}")))?;
            let tensor = reader.tensor()?;
            Ok(Record::Input {
                index,
                kind,
                tensor,
            })
        }
        TAG_OPERATOR => {
            let op = reader.string()?;
            let inputs = reader.strings()?;
            let output_count = reader.u32()?;
            let outputs = (0..output_count)
                .map(|_| reader.tensor())
                .collect::<DelegateResult<_>>()?;
            let attr_count = reader.u32()?;
            let attributes = (0..attr_count)
                .map(|_| reader.attribute())
                .collect::<DelegateResult<_>>()?;
            Ok(Record::Operator {
                op,
                inputs,
                outputs,
                attributes,
            })
        }
        TAG_OUTPUT => Ok(Record::Output {
            names: reader.strings()?,
        }),
        other => Err(malformed(format!("unknown record tag {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ArtifactBuilder {
        let meta = TensorMeta::new(DType::F32, vec![1, 4]);
        let mut builder = ArtifactBuilder::new();
        builder.add_input(0, InputKind::UserInput, TensorDesc::new("x", &meta));
        builder.add_operator(
            "CLAMP",
            vec!["x".into()],
            vec![TensorDesc::new("y", &meta)],
            vec![
                Attribute::new("min", AttrValue::Float(0.0)),
                Attribute::new("perms", AttrValue::Ints(vec![1, 0])),
            ],
        );
        builder.add_output(vec!["y".into()]);
        builder
    }

    #[test]
    fn test_header_layout() {
        let bytes = sample().serialize();
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), VERSION);
        assert_eq!(u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 3);
        assert_eq!(bytes[12], TAG_INPUT);
    }

    #[test]
    fn test_decode_preserves_record_order() {
        let builder = sample();
        let artifact = Artifact::decode(&builder.serialize()).unwrap();
        assert_eq!(artifact.records, builder.records());
        let kinds: Vec<_> = artifact.records.iter().map(Record::kind_name).collect();
        assert_eq!(kinds, vec!["input", "operator", "output"]);
    }

    #[test]
    fn test_decode_rejects_truncation_and_bad_magic() {
        let bytes = sample().serialize();
        assert!(matches!(
            Artifact::decode(&bytes[..bytes.len() - 1]),
            Err(DelegateError::MalformedArtifact { .. })
        ));

        let mut bad = bytes.clone();
        bad[0] = b'X';
        assert!(Artifact::decode(&bad).is_err());
    }

    #[test]
    fn test_decode_rejects_inflated_record_count() {
        let mut bytes = ArtifactBuilder::new().serialize();
        bytes[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            Artifact::decode(&bytes),
            Err(DelegateError::MalformedArtifact { .. })
        ));

        let mut bytes = sample().serialize();
        bytes[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            Artifact::decode(&bytes),
            Err(DelegateError::MalformedArtifact { .. })
        ));
    }

    #[test]
    fn test_descriptor_json() {
        let builder = sample();
        let json = builder.descriptor().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["records"][0]["record"], "input");
        assert_eq!(value["records"][0]["kind"], "user_input");
        assert_eq!(value["records"][1]["op"], "CLAMP");
        assert_eq!(value["records"][1]["attributes"][1]["value"][1], 0);
        assert_eq!(value["records"][2]["names"][0], "y");
    }
}
