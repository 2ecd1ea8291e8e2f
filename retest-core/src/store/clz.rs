// CLZ snapshot: `checksums.clz` (flat class table) and `tests.clz`
// (per-test class lists, which may contain `*`).
//
//   #retest clz-checksums v1        #retest clz-tests v1
//   generation <uuid>               generation <uuid>
//   created <rfc3339>               encoding plain|indexed
//   <class> <checksum>              test <n> <id>
//   end <n>                         <class>                (n lines)
//                                   end <records>

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::format::{self, LineReader};
use super::index::IdCodec;
use super::{CLZ_CHECKSUMS_FILE, CLZ_TESTS_FILE};
use crate::config::TestIdEncoding;
use crate::error::StoreError;
use crate::types::{Checksum, ChecksumSnapshot, ClassName, ClzSnapshot, TestId};

const CHECKSUMS_KIND: &str = "clz-checksums";
const TESTS_KIND: &str = "clz-tests";

pub(crate) fn encode_checksums(checksums: &ChecksumSnapshot, generation: Uuid, created: DateTime<Utc>) -> String {
    let mut out = format::header(CHECKSUMS_KIND);
    format::push_field(&mut out, "generation", generation);
    format::push_field(&mut out, "created", created.to_rfc3339());
    for (class, checksum) in checksums {
        out.push_str(class.as_str());
        out.push(' ');
        out.push_str(checksum.as_str());
        out.push('\n');
    }
    format::push_end(&mut out, checksums.len());
    out
}

pub(crate) struct ChecksumTable {
    pub generation: Uuid,
    pub created: DateTime<Utc>,
    pub checksums: ChecksumSnapshot,
}

pub(crate) fn decode_checksums(text: &str) -> Result<ChecksumTable, StoreError> {
    let mut r = LineReader::new(CLZ_CHECKSUMS_FILE, text);
    r.expect_header(CHECKSUMS_KIND)?;
    let generation = r.generation()?;
    let created = r.created()?;

    let mut checksums = ChecksumSnapshot::new();
    loop {
        let line = r.next_line()?;
        if let Some(count) = format::split_field(line, "end") {
            let count: usize = count
                .parse()
                .map_err(|_| r.corrupt(format!("bad end count {count:?}")))?;
            if count != checksums.len() {
                return Err(r.corrupt(format!("end count {count} does not match {} rows", checksums.len())));
            }
            r.expect_eof()?;
            break;
        }
        let (class, checksum) = format::split_pair(line)
            .and_then(|(c, k)| Some((c, Checksum::parse(k)?)))
            .ok_or_else(|| r.corrupt(format!("bad checksum row {line:?}")))?;
        if checksums.insert(ClassName::from(class), checksum).is_some() {
            return Err(r.corrupt(format!("duplicate class {class}")));
        }
    }
    Ok(ChecksumTable {
        generation,
        created,
        checksums,
    })
}

pub(crate) fn encode_tests(
    snapshot: &ClzSnapshot,
    generation: Uuid,
    encoding: TestIdEncoding,
    ids: IdCodec<'_>,
) -> String {
    let mut out = format::header(TESTS_KIND);
    format::push_field(&mut out, "generation", generation);
    format::push_field(&mut out, "encoding", encoding);
    for (test, classes) in &snapshot.tests {
        format::push_field(&mut out, "test", format!("{} {}", classes.len(), ids.encode(test)));
        for class in classes {
            out.push_str(class.as_str());
            out.push('\n');
        }
    }
    format::push_end(&mut out, snapshot.tests.len());
    out
}

pub(crate) struct TestsHeader {
    pub generation: Uuid,
    pub encoding: TestIdEncoding,
}

pub(crate) fn read_tests_header(reader: &mut LineReader<'_>) -> Result<TestsHeader, StoreError> {
    reader.expect_header(TESTS_KIND)?;
    Ok(TestsHeader {
        generation: reader.generation()?,
        encoding: reader.encoding()?,
    })
}

pub(crate) type TestLists = std::collections::BTreeMap<TestId, BTreeSet<ClassName>>;

pub(crate) fn read_tests_body(reader: &mut LineReader<'_>, ids: IdCodec<'_>) -> Result<TestLists, StoreError> {
    let mut tests = TestLists::new();
    loop {
        let line = reader.next_line()?;
        if let Some(rest) = format::split_field(line, "test") {
            let (count, token) = rest
                .split_once(' ')
                .ok_or_else(|| reader.corrupt("malformed test record"))?;
            let count: usize = count
                .parse()
                .map_err(|_| reader.corrupt(format!("bad class count {count:?}")))?;
            let test = ids.decode(token, reader)?;
            let mut classes = BTreeSet::new();
            for _ in 0..count {
                let class = reader.next_line()?;
                let class = ClassName::parse(class).map_err(|e| reader.corrupt(e))?;
                classes.insert(class);
            }
            if classes.len() != count {
                return Err(reader.corrupt("duplicate class in test list"));
            }
            if tests.insert(test, classes).is_some() {
                return Err(reader.corrupt("duplicate test record"));
            }
        } else if let Some(count) = format::split_field(line, "end") {
            let count: usize = count
                .parse()
                .map_err(|_| reader.corrupt(format!("bad end count {count:?}")))?;
            if count != tests.len() {
                return Err(reader.corrupt(format!("end count {count} does not match {} records", tests.len())));
            }
            reader.expect_eof()?;
            return Ok(tests);
        } else {
            return Err(reader.corrupt(format!("unexpected line {line:?}")));
        }
    }
}
