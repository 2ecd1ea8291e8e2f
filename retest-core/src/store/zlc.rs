// `deps.zlc`: one record per test with embedded class checksums.
//
//   #retest zlc v1
//   generation <uuid>
//   encoding plain|indexed
//   created <rfc3339>
//   test <wildcard 0|1> <n> <id>
//   <class> <checksum>          (n lines)
//   ...
//   unreached <n>
//   <class> <checksum>          (n lines)
//   end <records>

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::format::{self, LineReader};
use super::index::IdCodec;
use crate::config::TestIdEncoding;
use crate::error::StoreError;
use crate::types::{Checksum, ChecksumSnapshot, ClassName, TestDependencyRecord, ZlcSnapshot};

const KIND: &str = "zlc";

pub(crate) struct ZlcHeader {
    pub generation: Uuid,
    pub encoding: TestIdEncoding,
    pub created: DateTime<Utc>,
}

pub(crate) fn encode(snapshot: &ZlcSnapshot, header: &ZlcHeader, ids: IdCodec<'_>) -> String {
    let mut out = format::header(KIND);
    format::push_field(&mut out, "generation", header.generation);
    format::push_field(&mut out, "encoding", header.encoding);
    format::push_field(&mut out, "created", header.created.to_rfc3339());

    for (test, record) in &snapshot.records {
        format::push_field(
            &mut out,
            "test",
            format!(
                "{} {} {}",
                u8::from(record.reaches_wildcard),
                record.classes.len(),
                ids.encode(test)
            ),
        );
        push_checksums(&mut out, &record.classes);
    }
    format::push_field(&mut out, "unreached", snapshot.unreached.len());
    push_checksums(&mut out, &snapshot.unreached);
    format::push_end(&mut out, snapshot.records.len());
    out
}

fn push_checksums(out: &mut String, rows: &ChecksumSnapshot) {
    for (class, checksum) in rows {
        out.push_str(class.as_str());
        out.push(' ');
        out.push_str(checksum.as_str());
        out.push('\n');
    }
}

/// Read the preamble only; the caller resolves the id codec from it.
pub(crate) fn read_header(reader: &mut LineReader<'_>) -> Result<ZlcHeader, StoreError> {
    reader.expect_header(KIND)?;
    Ok(ZlcHeader {
        generation: reader.generation()?,
        encoding: reader.encoding()?,
        created: reader.created()?,
    })
}

/// Read the body following [`read_header`].
pub(crate) fn read_body(reader: &mut LineReader<'_>, ids: IdCodec<'_>) -> Result<ZlcSnapshot, StoreError> {
    let mut snapshot = ZlcSnapshot::default();
    loop {
        let line = reader.next_line()?;
        if let Some(rest) = format::split_field(line, "test") {
            let mut parts = rest.splitn(3, ' ');
            let (Some(flag), Some(count), Some(token)) = (parts.next(), parts.next(), parts.next()) else {
                return Err(reader.corrupt("malformed test record"));
            };
            let reaches_wildcard = match flag {
                "0" => false,
                "1" => true,
                other => return Err(reader.corrupt(format!("bad wildcard flag {other:?}"))),
            };
            let count: usize = count
                .parse()
                .map_err(|_| reader.corrupt(format!("bad class count {count:?}")))?;
            let test = ids.decode(token, reader)?;
            let classes = read_checksums(reader, count)?;
            let record = TestDependencyRecord {
                reaches_wildcard,
                classes,
            };
            if snapshot.records.insert(test, record).is_some() {
                return Err(reader.corrupt("duplicate test record"));
            }
        } else if let Some(count) = format::split_field(line, "unreached") {
            let count: usize = count
                .parse()
                .map_err(|_| reader.corrupt(format!("bad unreached count {count:?}")))?;
            snapshot.unreached = read_checksums(reader, count)?;
            break;
        } else {
            return Err(reader.corrupt(format!("unexpected line {line:?}")));
        }
    }
    reader.finish(snapshot.records.len())?;
    Ok(snapshot)
}

fn read_checksums(reader: &mut LineReader<'_>, count: usize) -> Result<ChecksumSnapshot, StoreError> {
    let mut rows = ChecksumSnapshot::new();
    for _ in 0..count {
        let line = reader.next_line()?;
        let (class, checksum) =
            format::split_pair(line).ok_or_else(|| reader.corrupt(format!("bad checksum row {line:?}")))?;
        let checksum = Checksum::parse(checksum).ok_or_else(|| reader.corrupt("bad checksum"))?;
        if rows.insert(ClassName::from(class), checksum).is_some() {
            return Err(reader.corrupt(format!("duplicate class {class}")));
        }
    }
    Ok(rows)
}

/// Convenience for tests and single-file plain snapshots.
#[cfg(test)]
pub(crate) fn decode_plain(text: &str) -> Result<ZlcSnapshot, StoreError> {
    let mut reader = LineReader::new(super::ZLC_FILE, text);
    read_header(&mut reader)?;
    read_body(&mut reader, IdCodec::Plain)
}
