use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::error::{OstreeError, Result};

/// Width of the `commit ` and `Date:  ` labels in log/show output
const LABEL_WIDTH: usize = 7;

/// Prefix of the line that opens a commit block in `ostree log`
const COMMIT_BOUNDARY: &str = "commit ";

/// Header, date, blank separator and at least one message line
const MIN_COMMIT_LINES: usize = 4;

/// Owner, group and other permission bits, most significant first
const PERMISSION_BITS: [(u32, char); 9] = [
    (0o400, 'r'),
    (0o200, 'w'),
    (0o100, 'x'),
    (0o040, 'r'),
    (0o020, 'w'),
    (0o010, 'x'),
    (0o004, 'r'),
    (0o002, 'w'),
    (0o001, 'x'),
];

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y/%m/%d %H:%M:%S %z",
    "%a %b %e %H:%M:%S %Y %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%a %b %e %H:%M:%S %Y",
    "%b %e %Y %H:%M:%S",
    "%b %e %Y %H:%M",
    "%a, %d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%b %e %Y", "%d %b %Y"];

/// Outcome of parsing a chunk that may legitimately be too short to hold a
/// record, such as the empty chunk before the first `commit` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "record", rename_all = "snake_case")]
pub enum Parsed<T> {
    Complete(T),
    Incomplete,
}

impl<T> Parsed<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, Parsed::Complete(_))
    }

    pub fn complete(&self) -> Option<&T> {
        match self {
            Parsed::Complete(record) => Some(record),
            Parsed::Incomplete => None,
        }
    }

    pub fn into_complete(self) -> Option<T> {
        match self {
            Parsed::Complete(record) => Some(record),
            Parsed::Incomplete => None,
        }
    }
}

/// Parse `ostree refs` output, one ref per line
pub fn parse_refs(output: &str) -> Vec<String> {
    output
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `ostree log` output into one entry per commit block.
///
/// Blocks start at each `commit ` line. The text before the first boundary
/// is a block of its own, so a log of N commits yields N + 1 entries with a
/// leading `Parsed::Incomplete`.
pub fn parse_log(output: &str) -> Result<Vec<Parsed<CommitRecord>>> {
    let mut commits = Vec::new();
    let mut block: Vec<&str> = Vec::new();

    for line in output.split('\n') {
        if line.starts_with(COMMIT_BOUNDARY) {
            commits.push(parse_commit(&block)?);
            block.clear();
        }
        block.push(line);
    }
    commits.push(parse_commit(&block)?);

    Ok(commits)
}

/// Parse `ostree show` output, which holds a single commit block
pub fn parse_show(output: &str) -> Result<Parsed<CommitRecord>> {
    let lines: Vec<&str> = output.split('\n').collect();
    parse_commit(&lines)
}

/// Parse the lines of one commit block.
///
/// Layout: `commit <hash>`, optional `Parent:`/`ContentChecksum:` lines,
/// `Date:  <date-time>`, optional `Version:` line, then the message.
pub fn parse_commit<S: AsRef<str>>(lines: &[S]) -> Result<Parsed<CommitRecord>> {
    if lines.len() < MIN_COMMIT_LINES {
        return Ok(Parsed::Incomplete);
    }

    let revision = strip_label(lines[0].as_ref()).to_string();

    let mut parent = None;
    let mut content_checksum = None;
    let mut cursor = 1;
    while cursor + 1 < lines.len() {
        let line = lines[cursor].as_ref();
        if let Some(value) = line.strip_prefix("Parent:") {
            parent = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("ContentChecksum:") {
            content_checksum = Some(value.trim().to_string());
        } else {
            break;
        }
        cursor += 1;
    }

    let timestamp = parse_timestamp(strip_label(lines[cursor].as_ref()))?;
    cursor += 1;

    let mut version = None;
    if let Some(value) = lines
        .get(cursor)
        .and_then(|line| line.as_ref().strip_prefix("Version:"))
    {
        version = Some(value.trim().to_string());
        cursor += 1;
    }

    let message = lines[cursor..]
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join("\n");

    Ok(Parsed::Complete(CommitRecord {
        revision,
        parent,
        content_checksum,
        timestamp,
        version,
        message,
    }))
}

/// Parse a loosely formatted date-time, keeping wall-clock time and dropping
/// any UTC offset.
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.naive_local());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Ok(parsed.naive_local());
    }
    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(text, format) {
            return Ok(parsed.naive_local());
        }
    }

    let bare = ["UTC", "GMT", "Z"]
        .iter()
        .find_map(|zone| text.strip_suffix(zone))
        .map(str::trim_end)
        .unwrap_or(text);

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(bare, format) {
            return Ok(parsed);
        }
    }
    for format in DATE_FORMATS {
        if let Some(midnight) = NaiveDate::parse_from_str(bare, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
        {
            return Ok(midnight);
        }
    }

    Err(OstreeError::DateFormat(text.to_string()))
}

/// Parse one line of `ostree diff` output: `<A|M|R> [field] <path>`.
///
/// The path is the last piece of a right-anchored split into at most three
/// whitespace-separated pieces, so a path containing spaces loses everything
/// before its last space.
pub fn parse_diff_line(line: &str) -> Result<DiffEntry> {
    let line = line.trim();
    let kind = DiffEntryKind::from_marker(line.chars().next());

    let fields = split_fields_right(line, 3);
    let path = match fields.as_slice() {
        [_, .., path] => path.to_string(),
        _ => return Err(OstreeError::MalformedLine(line.to_string())),
    };

    Ok(DiffEntry { kind, path })
}

/// Parse `ostree diff` output, one entry per line
pub fn parse_diff(output: &str) -> Result<Vec<DiffEntry>> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }

    output.split('\n').map(parse_diff_line).collect()
}

/// Parse one line of `ostree ls` output: `<type><mode> <uid> <gid> <size> <path>`.
///
/// The left-anchored split (at most 4 fields) yields mode, uid and gid; the
/// right-anchored split (at most 3 fields) yields size and path. A line with
/// fewer than 3 left fields is `Parsed::Incomplete`.
pub fn parse_file_entry(line: &str) -> Result<Parsed<FileEntry>> {
    let line = line.trim();

    let left = split_fields_left(line, 4);
    if left.len() < 3 {
        return Ok(Parsed::Incomplete);
    }

    let kind = FileEntryKind::from_type_char(left[0].chars().next());
    let mode = parse_mode(left[0])?;
    let owner_id = parse_number("uid", left[1])?;
    let group_id = parse_number("gid", left[2])?;

    let (listing, symlink_target) = match line.split_once(" -> ") {
        Some((head, target)) if kind == FileEntryKind::Symlink => {
            (head.trim_end(), Some(target.trim().to_string()))
        }
        _ => (line, None),
    };

    let right = split_fields_right(listing, 3);
    if right.len() < 3 {
        return Ok(Parsed::Incomplete);
    }
    let size_bytes = parse_number("size", right[1])?;
    let full_path = right[2].to_string();
    let name = full_path
        .rsplit_once('/')
        .map_or(full_path.as_str(), |(_, name)| name)
        .to_string();

    Ok(Parsed::Complete(FileEntry {
        kind,
        mode,
        permissions: format_permissions(mode),
        owner_id,
        group_id,
        size_bytes,
        full_path,
        name,
        symlink_target,
    }))
}

/// Parse `ostree ls` output, one entry per line
pub fn parse_listing(output: &str) -> Result<Vec<Parsed<FileEntry>>> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }

    output.split('\n').map(parse_file_entry).collect()
}

/// Render the nine permission bits of `mode` as an `rwxr-xr-x` string
pub fn format_permissions(mode: u32) -> String {
    PERMISSION_BITS
        .iter()
        .map(|&(bit, letter)| if mode & bit == bit { letter } else { '-' })
        .collect()
}

/// Mode bits from a listing field such as `-00644` or `-rw-r--r--`
fn parse_mode(field: &str) -> Result<u32> {
    let invalid = || OstreeError::InvalidNumber {
        field: "mode",
        value: field.to_string(),
    };

    let mut chars = field.chars();
    chars.next();
    let bits = chars.as_str();

    if !bits.is_empty() && bits.chars().all(|c| c.is_digit(8)) {
        return u32::from_str_radix(bits, 8).map_err(|_| invalid());
    }

    parse_symbolic_mode(bits).ok_or_else(invalid)
}

fn parse_symbolic_mode(symbols: &str) -> Option<u32> {
    let symbols: Vec<char> = symbols.chars().collect();
    if symbols.len() != PERMISSION_BITS.len() {
        return None;
    }

    let mut mode = 0;
    let columns = symbols.iter().zip(PERMISSION_BITS.iter()).enumerate();
    for (index, (&symbol, &(bit, letter))) in columns {
        // setuid, setgid and sticky share the execute column
        let special = match index {
            2 => Some(('s', 0o4000)),
            5 => Some(('s', 0o2000)),
            8 => Some(('t', 0o1000)),
            _ => None,
        };

        mode |= match (symbol, special) {
            ('-', _) => 0,
            (symbol, _) if symbol == letter => bit,
            (symbol, Some((flag, extra))) if symbol == flag => bit | extra,
            (symbol, Some((flag, extra))) if symbol == flag.to_ascii_uppercase() => extra,
            _ => return None,
        };
    }

    Some(mode)
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T> {
    value.parse::<T>().map_err(|_| OstreeError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Drop the fixed-width label at the start of a log line
fn strip_label(line: &str) -> &str {
    line.char_indices()
        .nth(LABEL_WIDTH)
        .map_or("", |(start, _)| &line[start..])
}

/// Split on whitespace runs from the left into at most `max` fields; the last
/// field keeps the unsplit remainder.
fn split_fields_left(line: &str, max: usize) -> Vec<&str> {
    let mut fields = Vec::with_capacity(max);
    let mut rest = line.trim_start();

    while !rest.is_empty() {
        if fields.len() + 1 == max {
            fields.push(rest);
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                fields.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            None => {
                fields.push(rest);
                break;
            }
        }
    }

    fields
}

/// Split on whitespace runs from the right into at most `max` fields; the
/// first field keeps the unsplit remainder.
fn split_fields_right(line: &str, max: usize) -> Vec<&str> {
    let mut fields = Vec::with_capacity(max);
    let mut rest = line.trim_end();

    while !rest.is_empty() {
        if fields.len() + 1 == max {
            fields.push(rest);
            break;
        }
        match rest.rfind(char::is_whitespace) {
            Some(start) => {
                let width = rest[start..].chars().next().map_or(1, char::len_utf8);
                fields.push(&rest[start + width..]);
                rest = rest[..start].trim_end();
            }
            None => {
                fields.push(rest);
                break;
            }
        }
    }

    fields.reverse();
    fields
}

/// A commit from `ostree log` or `ostree show`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    pub revision: String,
    pub parent: Option<String>,
    pub content_checksum: Option<String>,
    /// Wall-clock time as printed, offset discarded
    pub timestamp: NaiveDateTime,
    pub version: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiffEntryKind {
    Added,
    Modified,
    Removed,
    Unknown,
}

impl DiffEntryKind {
    fn from_marker(marker: Option<char>) -> Self {
        match marker {
            Some('A') => DiffEntryKind::Added,
            Some('M') => DiffEntryKind::Modified,
            Some('R') => DiffEntryKind::Removed,
            _ => DiffEntryKind::Unknown,
        }
    }
}

/// A changed path from `ostree diff`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    pub kind: DiffEntryKind,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileEntryKind {
    RegularFile,
    Directory,
    Symlink,
    Unknown,
}

impl FileEntryKind {
    fn from_type_char(type_char: Option<char>) -> Self {
        match type_char {
            Some('-') => FileEntryKind::RegularFile,
            Some('d') => FileEntryKind::Directory,
            Some('l') => FileEntryKind::Symlink,
            _ => FileEntryKind::Unknown,
        }
    }
}

/// A path from `ostree ls`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub kind: FileEntryKind,
    /// Numeric mode as listed, including any setuid/setgid/sticky bits
    pub mode: u32,
    pub permissions: String,
    pub owner_id: u32,
    pub group_id: u32,
    pub size_bytes: u64,
    pub full_path: String,
    pub name: String,
    pub symlink_target: Option<String>,
}
