//! Dependency manifest (pip requirements file) parsing.
//!
//! A manifest must exist and be syntactically valid before any installer is
//! invoked. Included files (`-r`, `-c`) are resolved relative to the file
//! that names them; include cycles are errors.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use berth_common::error::{BerthError, Result};
use berth_common::types::Sha256Hash;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, space0},
    multi::{separated_list0, separated_list1},
    sequence::{delimited, preceded},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One declared package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    /// Distribution name, or the reference itself for path/URL requirements.
    pub name: String,
    /// Requested extras (`pkg[extra]`).
    pub extras: Vec<String>,
    /// Version specifiers as `(operator, version)`.
    pub specifiers: Vec<(String, String)>,
    /// Direct reference (`pkg @ url`, editable target, or bare path/URL).
    pub url: Option<String>,
    /// Environment marker after `;`.
    pub marker: Option<String>,
    /// Installed in editable mode.
    pub editable: bool,
    /// Accepted archive digests from `--hash` options, as `algo:hex`.
    pub hashes: Vec<String>,
    /// Line in the file that declared it.
    pub line: usize,
}

/// A fully loaded manifest, includes flattened.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Top-level manifest path.
    pub path: PathBuf,
    /// Every requirement, in declaration order.
    pub requirements: Vec<Requirement>,
    /// Constraints pulled in with `-c`; they pin but do not install.
    pub constraints: Vec<Requirement>,
    /// Digest of the top-level file contents.
    pub digest: Sha256Hash,
}

impl Manifest {
    /// Number of packages that will be installed.
    #[must_use]
    pub fn package_count(&self) -> usize {
        self.requirements.len()
    }
}

/// Options that pip accepts in requirement files and Berth passes through.
const PASSTHROUGH_WITH_VALUE: &[&str] = &[
    "-i",
    "--index-url",
    "--extra-index-url",
    "-f",
    "--find-links",
    "--trusted-host",
    "--no-binary",
    "--only-binary",
];
const PASSTHROUGH_FLAGS: &[&str] = &["--pre", "--prefer-binary", "--no-index"];

/// Loads and validates a manifest and everything it includes.
///
/// # Errors
///
/// Returns [`BerthError::Manifest`] if a file is missing, unreadable, or
/// contains a malformed line, and on include cycles.
pub fn load(path: &Path) -> Result<Manifest> {
    let bytes = fs::read(path).map_err(|e| BerthError::Manifest {
        path: path.to_path_buf(),
        line: 0,
        message: format!("cannot read manifest: {e}"),
    })?;
    let digest = Sha256Hash::from_hex(format!("{:x}", Sha256::digest(&bytes)))?;

    let mut loader = Loader::default();
    loader.load_file(path, false)?;
    if loader.require_hashes {
        loader.check_hashes()?;
    }
    tracing::info!(
        manifest = %path.display(),
        packages = loader.requirements.len(),
        constraints = loader.constraints.len(),
        "manifest validated"
    );

    Ok(Manifest {
        path: path.to_path_buf(),
        requirements: loader.requirements,
        constraints: loader.constraints,
        digest,
    })
}

#[derive(Default)]
struct Loader {
    stack: HashSet<PathBuf>,
    requirements: Vec<Requirement>,
    constraints: Vec<Requirement>,
    require_hashes: bool,
    origins: Vec<PathBuf>,
}

impl Loader {
    /// In hash-checking mode every requirement must be pinned with `==`
    /// and carry at least one `--hash`.
    fn check_hashes(&self) -> Result<()> {
        for (req, origin) in self.requirements.iter().zip(&self.origins) {
            let pinned = matches!(req.specifiers.as_slice(), [(op, _)] if op == "==" || op == "===");
            if req.url.is_none() && !pinned {
                return Err(manifest_err(
                    origin,
                    req.line,
                    format!("{} must be pinned with == when hashes are required", req.name),
                ));
            }
            if req.hashes.is_empty() {
                return Err(manifest_err(
                    origin,
                    req.line,
                    format!("{} has no --hash but hashes are required", req.name),
                ));
            }
        }
        Ok(())
    }

    fn push(&mut self, path: &Path, req: Requirement, as_constraints: bool) {
        if as_constraints {
            self.constraints.push(req);
        } else {
            self.requirements.push(req);
            self.origins.push(path.to_path_buf());
        }
    }

    fn load_file(&mut self, path: &Path, as_constraints: bool) -> Result<()> {
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if !self.stack.insert(key.clone()) {
            return Err(manifest_err(path, 0, "include cycle detected".into()));
        }

        let text = fs::read_to_string(path).map_err(|e| {
            manifest_err(path, 0, format!("cannot read manifest: {e}"))
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        for (number, body) in logical_lines(&text) {
            if body.starts_with('-') {
                self.load_option(path, base, number, &body, as_constraints)?;
                continue;
            }
            let mut req = parse_requirement(&body)
                .map_err(|message| manifest_err(path, number, message))?;
            req.line = number;
            self.push(path, req, as_constraints);
        }

        let _ = self.stack.remove(&key);
        Ok(())
    }

    fn load_option(
        &mut self,
        path: &Path,
        base: &Path,
        number: usize,
        body: &str,
        as_constraints: bool,
    ) -> Result<()> {
        let (opt, value) = split_option(body);
        match opt {
            "-r" | "--requirement" => {
                let target = require_value(path, number, opt, value)?;
                self.load_file(&base.join(target), as_constraints)
            }
            "-c" | "--constraint" => {
                let target = require_value(path, number, opt, value)?;
                self.load_file(&base.join(target), true)
            }
            "-e" | "--editable" => {
                let target = require_value(path, number, opt, value)?;
                self.push(path, editable(target, number), as_constraints);
                Ok(())
            }
            o if PASSTHROUGH_WITH_VALUE.contains(&o) => {
                let _ = require_value(path, number, opt, value)?;
                Ok(())
            }
            "--require-hashes" => {
                self.require_hashes = true;
                Ok(())
            }
            o if PASSTHROUGH_FLAGS.contains(&o) => Ok(()),
            other => Err(manifest_err(
                path,
                number,
                format!("unsupported option {other}"),
            )),
        }
    }
}

fn manifest_err(path: &Path, line: usize, message: String) -> BerthError {
    BerthError::Manifest {
        path: path.to_path_buf(),
        line,
        message,
    }
}

fn require_value<'a>(path: &Path, line: usize, opt: &str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() {
        Err(manifest_err(path, line, format!("option {opt} requires a value")))
    } else {
        Ok(value)
    }
}

/// Splits `-rfile`, `-r file`, `--requirement=file` and `--requirement file`.
fn split_option(body: &str) -> (&str, &str) {
    if let Some(long) = body.strip_prefix("--") {
        let end = long
            .find(|c: char| c == '=' || c.is_whitespace())
            .map_or(body.len(), |i| i + 2);
        let (opt, rest) = body.split_at(end);
        return (opt, rest.trim_start_matches('=').trim());
    }
    let split = body.char_indices().nth(2).map_or(body.len(), |(i, _)| i);
    let (opt, rest) = body.split_at(split);
    (opt, rest.trim())
}

fn editable(target: &str, line: usize) -> Requirement {
    let name = target
        .split_once("#egg=")
        .map_or(target, |(_, egg)| egg)
        .to_string();
    Requirement {
        name,
        extras: Vec::new(),
        specifiers: Vec::new(),
        url: Some(target.to_string()),
        marker: None,
        editable: true,
        hashes: Vec::new(),
        line,
    }
}

/// Joins continuations and strips comments, yielding `(line, text)` pairs.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    for (idx, raw) in text.lines().enumerate() {
        let stripped = strip_comment(raw);
        let (start, mut acc) = pending.take().unwrap_or_else(|| (idx + 1, String::new()));
        if let Some(body) = stripped.trim_end().strip_suffix('\\') {
            acc.push_str(body);
            pending = Some((start, acc));
            continue;
        }
        acc.push_str(stripped);
        let trimmed = acc.trim();
        if !trimmed.is_empty() {
            out.push((start, trimmed.to_string()));
        }
    }
    if let Some((start, acc)) = pending {
        let trimmed = acc.trim();
        if !trimmed.is_empty() {
            out.push((start, trimmed.to_string()));
        }
    }
    out
}

fn strip_comment(line: &str) -> &str {
    let mut prev_ws = true;
    for (i, c) in line.char_indices() {
        if c == '#' && prev_ws {
            return &line[..i];
        }
        prev_ws = c.is_whitespace();
    }
    line
}

fn name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))(input)
}

fn extras(input: &str) -> IResult<&str, Vec<&str>> {
    delimited(
        char('['),
        separated_list0(char(','), delimited(space0, name, space0)),
        char(']'),
    )
    .parse(input)
}

fn operator(input: &str) -> IResult<&str, &str> {
    alt((
        tag("==="),
        tag("=="),
        tag("!="),
        tag("~="),
        tag(">="),
        tag("<="),
        tag(">"),
        tag("<"),
    ))
    .parse(input)
}

fn specifier(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, _) = space0(input)?;
    let (input, op) = operator(input)?;
    let (input, _) = space0(input)?;
    let (input, version) =
        take_while1(|c: char| !c.is_whitespace() && !matches!(c, ',' | ';' | ')'))(input)?;
    Ok((input, (op, version)))
}

fn specifiers(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    separated_list1(preceded(space0, char(',')), specifier).parse(input)
}

fn is_direct_reference(body: &str) -> bool {
    body.starts_with('.') || body.starts_with('/') || body.contains("://")
}

/// Per-requirement options pip accepts after a specifier.
const REQUIREMENT_OPTIONS: &[&str] = &["--hash", "--config-settings", "--global-option"];
const HASH_ALGORITHMS: &[&str] = &["sha256", "sha384", "sha512"];

/// Splits `spec --opt ...` at the first word that starts with `--`.
fn split_requirement_options(body: &str) -> (&str, &str) {
    let body = body.trim();
    let mut prev_ws = false;
    for (i, c) in body.char_indices() {
        if prev_ws && body[i..].starts_with("--") {
            return (body[..i].trim_end(), &body[i..]);
        }
        prev_ws = c.is_whitespace();
    }
    (body, "")
}

/// Validates trailing per-requirement options and returns the `--hash` values.
fn parse_requirement_options(text: &str) -> std::result::Result<Vec<String>, String> {
    let mut hashes = Vec::new();
    let mut words = text.split_whitespace();
    while let Some(word) = words.next() {
        let (opt, inline) = match word.split_once('=') {
            Some((o, v)) => (o, Some(v)),
            None => (word, None),
        };
        if !REQUIREMENT_OPTIONS.contains(&opt) {
            return Err(format!("unexpected text \"{word}\""));
        }
        let value = inline
            .or_else(|| words.next())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| format!("option {opt} requires a value"))?;
        if opt == "--hash" {
            let valid = value.split_once(':').is_some_and(|(algo, hex)| {
                HASH_ALGORITHMS.contains(&algo)
                    && !hex.is_empty()
                    && hex.chars().all(|c| c.is_ascii_hexdigit())
            });
            if !valid {
                return Err(format!("malformed hash \"{value}\""));
            }
            hashes.push(value.to_string());
        }
    }
    Ok(hashes)
}

/// Parses one requirement specifier line.
///
/// # Errors
///
/// Returns a description of the first syntax problem.
pub fn parse_requirement(body: &str) -> std::result::Result<Requirement, String> {
    let mut req = Requirement {
        name: String::new(),
        extras: Vec::new(),
        specifiers: Vec::new(),
        url: None,
        marker: None,
        editable: false,
        hashes: Vec::new(),
        line: 0,
    };

    let (body, options) = split_requirement_options(body);
    req.hashes = parse_requirement_options(options)?;

    if is_direct_reference(body) {
        let (reference, marker) = match body.split_once(';') {
            Some((r, m)) => (r.trim(), Some(m.trim())),
            None => (body, None),
        };
        req.name = reference.to_string();
        req.url = Some(reference.to_string());
        req.marker = marker.map(String::from);
        return Ok(req);
    }

    let (rest, pkg) = name(body).map_err(|_| format!("expected a package name in \"{body}\""))?;
    if !pkg.ends_with(|c: char| c.is_ascii_alphanumeric())
        || !pkg.starts_with(|c: char| c.is_ascii_alphanumeric())
    {
        return Err(format!("invalid package name \"{pkg}\""));
    }
    req.name = pkg.to_string();

    let mut rest = rest.trim_start();
    if rest.starts_with('[') {
        let (after, names) = extras(rest).map_err(|_| format!("malformed extras in \"{body}\""))?;
        req.extras = names.into_iter().map(String::from).collect();
        rest = after.trim_start();
    }

    if let Some(url) = rest.strip_prefix('@') {
        let (url, after) = url.split_once(';').map_or((url, ""), |(u, m)| (u, m));
        let url = url.trim();
        if url.is_empty() {
            return Err(format!("missing URL after @ in \"{body}\""));
        }
        req.url = Some(url.to_string());
        if !after.trim().is_empty() {
            req.marker = Some(after.trim().to_string());
        }
        return Ok(req);
    }

    if !rest.is_empty() && !rest.starts_with(';') {
        let (inner, tail) = match rest.strip_prefix('(') {
            Some(open) => {
                let (inside, after) = open
                    .split_once(')')
                    .ok_or_else(|| format!("unclosed parenthesis in \"{body}\""))?;
                (inside, Some(after))
            }
            None => (rest, None),
        };
        let (after, specs) =
            specifiers(inner).map_err(|_| format!("malformed version specifier in \"{body}\""))?;
        req.specifiers = specs
            .into_iter()
            .map(|(op, v)| (op.to_string(), v.to_string()))
            .collect();
        rest = match tail {
            Some(t) if after.trim().is_empty() => t.trim_start(),
            Some(_) => return Err(format!("unexpected text \"{}\" in \"{body}\"", after.trim())),
            None => after.trim_start(),
        };
    }

    if let Some(marker) = rest.strip_prefix(';') {
        let marker = marker.trim();
        if marker.is_empty() {
            return Err(format!("empty environment marker in \"{body}\""));
        }
        req.marker = Some(marker.to_string());
    } else if !rest.is_empty() {
        return Err(format!("unexpected text \"{rest}\" in \"{body}\""));
    }

    Ok(req)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn parse_plain_name() {
        let req = parse_requirement("flask").unwrap();
        assert_eq!(req.name, "flask");
        assert!(req.specifiers.is_empty());
    }

    #[test]
    fn parse_pinned_with_extras_and_marker() {
        let req =
            parse_requirement("pymongo[srv, snappy]>=4.6,<5 ; python_version >= \"3.8\"").unwrap();
        assert_eq!(req.name, "pymongo");
        assert_eq!(req.extras, vec!["srv", "snappy"]);
        assert_eq!(
            req.specifiers,
            vec![(">=".into(), "4.6".into()), ("<".into(), "5".into())]
        );
        assert_eq!(req.marker.as_deref(), Some("python_version >= \"3.8\""));
    }

    #[test]
    fn parse_parenthesised_specifiers() {
        let req = parse_requirement("pandas (==2.2.1)").unwrap();
        assert_eq!(req.specifiers, vec![("==".into(), "2.2.1".into())]);
    }

    #[test]
    fn parse_direct_url_reference() {
        let req = parse_requirement("prefect @ https://example.com/prefect-2.0.whl").unwrap();
        assert_eq!(req.name, "prefect");
        assert_eq!(req.url.as_deref(), Some("https://example.com/prefect-2.0.whl"));
    }

    #[test]
    fn parse_bare_path_reference() {
        let req = parse_requirement("./vendor/minio-7.2.0.tar.gz").unwrap();
        assert_eq!(req.url.as_deref(), Some("./vendor/minio-7.2.0.tar.gz"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_requirement("==1.0").is_err());
        assert!(parse_requirement("flask ==").is_err());
        assert!(parse_requirement("flask 1.0").is_err());
        assert!(parse_requirement("-flask").is_err());
        assert!(parse_requirement("flask; ").is_err());
    }

    #[test]
    fn unresolvable_name_is_still_valid_syntax() {
        let req = parse_requirement("this-package-does-not-exist==0.0.0").unwrap();
        assert_eq!(req.name, "this-package-does-not-exist");
        assert_eq!(req.specifiers, vec![("==".into(), "0.0.0".into())]);
    }

    #[test]
    fn strip_comment_only_after_whitespace() {
        assert_eq!(strip_comment("flask # web"), "flask ");
        assert_eq!(strip_comment("# whole line"), "");
        assert_eq!(strip_comment("pkg @ https://x/y#egg=pkg"), "pkg @ https://x/y#egg=pkg");
    }

    #[test]
    fn split_option_spellings() {
        assert_eq!(split_option("-r base.txt"), ("-r", "base.txt"));
        assert_eq!(split_option("-rbase.txt"), ("-r", "base.txt"));
        assert_eq!(split_option("--requirement=base.txt"), ("--requirement", "base.txt"));
        assert_eq!(split_option("--requirement base.txt"), ("--requirement", "base.txt"));
        assert_eq!(split_option("--pre"), ("--pre", ""));
    }

    #[test]
    fn load_empty_manifest_has_zero_packages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), "requirements.txt", "");
        let m = load(&path).expect("load");
        assert_eq!(m.package_count(), 0);
        assert_eq!(
            m.digest.as_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn load_follows_includes_and_constraints() {
        let dir = tempfile::tempdir().expect("tempdir");
        let _ = write(dir.path(), "base.txt", "flask==3.0.0\n");
        let _ = write(dir.path(), "pins/constraints.txt", "numpy<2\n");
        let path = write(
            dir.path(),
            "requirements.txt",
            "# service deps\n-r base.txt\n-c pins/constraints.txt\n--extra-index-url https://pypi.example\npymongo \\\n  >=4.6\n-e ./libs/etl#egg=etl\n",
        );
        let m = load(&path).expect("load");
        let names: Vec<&str> = m.requirements.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["flask", "pymongo", "etl"]);
        assert_eq!(m.requirements[1].line, 5);
        assert!(m.requirements[2].editable);
        assert_eq!(m.constraints.len(), 1);
        assert_eq!(m.constraints[0].name, "numpy");
    }

    #[test]
    fn load_missing_file_is_manifest_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load(&dir.path().join("requirements.txt")).unwrap_err();
        assert!(matches!(err, BerthError::Manifest { .. }), "got: {err}");
    }

    #[test]
    fn load_reports_bad_line_number() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), "requirements.txt", "flask\n\nnot a requirement!\n");
        let err = load(&path).unwrap_err();
        match err {
            BerthError::Manifest { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_rejects_unknown_option() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), "requirements.txt", "--bogus-flag\n");
        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("--bogus-flag"), "got: {err}");
    }

    #[test]
    fn parse_collects_hash_options() {
        let req = parse_requirement(
            "flask==3.0.0 --hash=sha256:ab12 --hash sha256:cd34 --config-settings=k=v",
        )
        .unwrap();
        assert_eq!(req.specifiers, vec![("==".into(), "3.0.0".into())]);
        assert_eq!(req.hashes, vec!["sha256:ab12", "sha256:cd34"]);
    }

    #[test]
    fn parse_rejects_bad_trailing_options() {
        assert!(parse_requirement("flask==3.0.0 --hash=md5:ab12").is_err());
        assert!(parse_requirement("flask==3.0.0 --hash").is_err());
        assert!(parse_requirement("flask==3.0.0 --upgrade").is_err());
    }

    #[test]
    fn load_accepts_continued_hashed_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hash = format!("sha256:{}", "0".repeat(64));
        let path = write(
            dir.path(),
            "requirements.txt",
            &format!("--require-hashes\nflask==3.0.0 \\\n    --hash={hash}\n"),
        );
        let m = load(&path).expect("load");
        assert_eq!(m.package_count(), 1);
        assert_eq!(m.requirements[0].line, 2);
        assert_eq!(m.requirements[0].hashes, vec![hash]);
    }

    #[test]
    fn require_hashes_rejects_unhashed_requirement() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hash = format!("sha256:{}", "a".repeat(64));
        let path = write(
            dir.path(),
            "requirements.txt",
            &format!("--require-hashes\nflask==3.0.0 --hash={hash}\npymongo==4.6.0\n"),
        );
        let err = load(&path).unwrap_err();
        assert!(matches!(err, BerthError::Manifest { line: 3, .. }), "got: {err}");
        assert!(err.to_string().contains("pymongo"), "got: {err}");
    }

    #[test]
    fn load_detects_include_cycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let _ = write(dir.path(), "a.txt", "-r b.txt\n");
        let _ = write(dir.path(), "b.txt", "-r a.txt\n");
        let err = load(&dir.path().join("a.txt")).unwrap_err();
        assert!(err.to_string().contains("cycle"), "got: {err}");
    }
}
