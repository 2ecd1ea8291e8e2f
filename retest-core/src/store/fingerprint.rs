// `classpath.fingerprint`: the library path shape recorded with a snapshot.
//
//   #retest classpath v1
//   fingerprint <sha256 hex>
//   <library path>              (one per line, for inspection)
//   end <n>

use super::CLASSPATH_FILE;
use super::format::{self, LineReader};
use crate::error::StoreError;
use crate::types::{Classpath, ClasspathFingerprint};

const KIND: &str = "classpath";

pub(crate) fn encode(classpath: &Classpath) -> String {
    let mut out = format::header(KIND);
    format::push_field(&mut out, "fingerprint", classpath.fingerprint());
    for lib in &classpath.libraries {
        out.push_str(&lib.to_string_lossy());
        out.push('\n');
    }
    format::push_end(&mut out, classpath.libraries.len());
    out
}

pub(crate) fn decode(text: &str) -> Result<ClasspathFingerprint, StoreError> {
    let mut r = LineReader::new(CLASSPATH_FILE, text);
    r.expect_header(KIND)?;
    let fingerprint = r.field("fingerprint")?;
    if fingerprint.len() != 64 || !fingerprint.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(r.corrupt(format!("bad fingerprint {fingerprint:?}")));
    }
    let fingerprint = ClasspathFingerprint(fingerprint.to_string());

    let mut paths = 0usize;
    loop {
        let line = r.next_line()?;
        if let Some(count) = format::split_field(line, "end") {
            if count.parse::<usize>().ok() != Some(paths) {
                return Err(r.corrupt(format!("end count {count:?} does not match {paths} paths")));
            }
            r.expect_eof()?;
            return Ok(fingerprint);
        }
        paths += 1;
    }
}
