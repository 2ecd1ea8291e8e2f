// Debug-attribute stripping for JVM class files.
//
// Recompiling after a comment or formatting edit shifts line numbers and
// local-variable ranges but leaves the executable bytecode alone. Removing the
// attributes that only carry that metadata makes the checksum stable across
// such edits. The constant pool is copied as-is: re-indexing it would change
// instruction operands. Pool entries only the dropped attributes refer to
// (local names, the SourceFile value) therefore still reach the checksum, and
// so does a `-g` / `-g:none` switch. Those edits select more tests, never fewer.

use crate::checksum::BytecodeNormalizer;
use crate::error::ChecksumError;

const MAGIC: u32 = 0xCAFE_BABE;

/// Class-level attributes that carry only source/debug metadata.
const CLASS_DEBUG_ATTRIBUTES: [&str; 2] = ["SourceFile", "SourceDebugExtension"];

/// `Code` sub-attributes that carry only debug metadata.
const CODE_DEBUG_ATTRIBUTES: [&str; 3] = [
    "LineNumberTable",
    "LocalVariableTable",
    "LocalVariableTypeTable",
];

/// Default smart-checksum normalizer.
#[derive(Debug, Default, Clone, Copy)]
pub struct DebugInfoStripper;

impl BytecodeNormalizer for DebugInfoStripper {
    fn normalize(&self, bytes: &[u8]) -> Result<Vec<u8>, ChecksumError> {
        strip_debug_info(bytes)
    }
}

/// Re-encode a class file without its debug-only attributes.
pub fn strip_debug_info(bytes: &[u8]) -> Result<Vec<u8>, ChecksumError> {
    let mut reader = Reader::new(bytes);
    let mut out = Vec::with_capacity(bytes.len());

    let magic = reader.u32()?;
    if magic != MAGIC {
        return Err(ChecksumError::MalformedClass(format!("bad magic 0x{magic:08X}")));
    }
    out.extend_from_slice(&MAGIC.to_be_bytes());
    // minor, major
    out.extend_from_slice(reader.take(4)?);

    let pool_start = reader.pos;
    let pool = ConstantPool::parse(&mut reader)?;
    out.extend_from_slice(reader.consumed_since(pool_start));

    // access_flags, this_class, super_class
    out.extend_from_slice(reader.take(6)?);
    let interfaces = reader.u16()?;
    out.extend_from_slice(&interfaces.to_be_bytes());
    out.extend_from_slice(reader.take(usize::from(interfaces) * 2)?);

    // fields, then methods: identical layout
    for _ in 0..2 {
        let count = reader.u16()?;
        out.extend_from_slice(&count.to_be_bytes());
        for _ in 0..count {
            // access_flags, name_index, descriptor_index
            out.extend_from_slice(reader.take(6)?);
            copy_attributes(&mut reader, &mut out, &pool, &[], true)?;
        }
    }

    copy_attributes(&mut reader, &mut out, &pool, &CLASS_DEBUG_ATTRIBUTES, false)?;

    if reader.pos != bytes.len() {
        return Err(ChecksumError::MalformedClass(format!(
            "{} trailing bytes",
            bytes.len() - reader.pos
        )));
    }
    Ok(out)
}

/// Copy an attribute table, dropping names in `drop`. When `rewrite_code` is
/// set, `Code` attributes are rebuilt without their debug sub-attributes.
fn copy_attributes(
    reader: &mut Reader<'_>,
    out: &mut Vec<u8>,
    pool: &ConstantPool,
    drop: &[&str],
    rewrite_code: bool,
) -> Result<(), ChecksumError> {
    let count = reader.u16()?;
    let mut kept: Vec<u8> = Vec::new();
    let mut kept_count: u16 = 0;

    for _ in 0..count {
        let name_index = reader.u16()?;
        let length = reader.u32()? as usize;
        let body = reader.take(length)?;
        let name = pool.utf8(name_index)?;

        if drop.contains(&name) {
            continue;
        }
        let body = if rewrite_code && name == "Code" {
            strip_code_attribute(body, pool)?
        } else {
            body.to_vec()
        };

        kept.extend_from_slice(&name_index.to_be_bytes());
        kept.extend_from_slice(&encode_len(body.len())?.to_be_bytes());
        kept.extend_from_slice(&body);
        kept_count += 1;
    }

    out.extend_from_slice(&kept_count.to_be_bytes());
    out.extend_from_slice(&kept);
    Ok(())
}

fn strip_code_attribute(body: &[u8], pool: &ConstantPool) -> Result<Vec<u8>, ChecksumError> {
    let mut reader = Reader::new(body);
    let mut out = Vec::with_capacity(body.len());

    // max_stack, max_locals
    out.extend_from_slice(reader.take(4)?);
    let code_length = reader.u32()?;
    out.extend_from_slice(&code_length.to_be_bytes());
    out.extend_from_slice(reader.take(code_length as usize)?);
    let handlers = reader.u16()?;
    out.extend_from_slice(&handlers.to_be_bytes());
    out.extend_from_slice(reader.take(usize::from(handlers) * 8)?);

    copy_attributes(&mut reader, &mut out, pool, &CODE_DEBUG_ATTRIBUTES, false)?;
    if reader.pos != body.len() {
        return Err(ChecksumError::MalformedClass("Code attribute length mismatch".into()));
    }
    Ok(out)
}

fn encode_len(len: usize) -> Result<u32, ChecksumError> {
    u32::try_from(len).map_err(|_| ChecksumError::MalformedClass("attribute too large".into()))
}

// ── Constant pool ──────────────────────────────────────────────────

/// Only UTF-8 entries are kept; attribute names are looked up there.
struct ConstantPool {
    utf8: Vec<Option<String>>,
}

impl ConstantPool {
    fn parse(reader: &mut Reader<'_>) -> Result<Self, ChecksumError> {
        let count = reader.u16()?;
        let mut utf8: Vec<Option<String>> = vec![None; usize::from(count)];
        let mut index: u16 = 1;
        while index < count {
            let tag = reader.u8()?;
            match tag {
                1 => {
                    let len = reader.u16()?;
                    let raw = reader.take(usize::from(len))?;
                    // Modified UTF-8; attribute names are plain ASCII, lossy is fine.
                    utf8[usize::from(index)] = Some(String::from_utf8_lossy(raw).into_owned());
                }
                // Integer, Float, Fieldref, Methodref, InterfaceMethodref,
                // NameAndType, Dynamic, InvokeDynamic
                3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => reader.skip(4)?,
                // Long, Double take two slots
                5 | 6 => {
                    reader.skip(8)?;
                    index += 1;
                }
                // Class, String, MethodType, Module, Package
                7 | 8 | 16 | 19 | 20 => reader.skip(2)?,
                // MethodHandle
                15 => reader.skip(3)?,
                other => {
                    return Err(ChecksumError::MalformedClass(format!(
                        "unknown constant pool tag {other} at index {index}"
                    )));
                }
            }
            index += 1;
        }
        Ok(Self { utf8 })
    }

    fn utf8(&self, index: u16) -> Result<&str, ChecksumError> {
        self.utf8
            .get(usize::from(index))
            .and_then(Option::as_deref)
            .ok_or_else(|| ChecksumError::MalformedClass(format!("attribute name #{index} is not UTF-8")))
    }
}

// ── Byte reader ────────────────────────────────────────────────────

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ChecksumError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| ChecksumError::MalformedClass(format!("truncated at byte {}", self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Bytes read between `start` and the current position.
    fn consumed_since(&self, start: usize) -> &'a [u8] {
        self.bytes.get(start..self.pos).unwrap_or_default()
    }

    fn skip(&mut self, len: usize) -> Result<(), ChecksumError> {
        self.take(len).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, ChecksumError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ChecksumError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ChecksumError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
