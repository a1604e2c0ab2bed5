//! Output file naming.
//!
//! The output name is the last path component of the input's name with its
//! final dot-suffix replaced by the target format identifier. Directory parts
//! are dropped, so `photos.v2/cat` becomes `cat.webp` and `../x.png` becomes
//! `x.webp`: an output name is always a single plain file name, safe to join
//! onto an output directory or use as a zip entry.

use crate::config::TargetFormat;

/// Replace the extension of `original` with `format`'s extension, or append
/// one when the name has none.
///
/// A leading dot (`.hidden`) counts as an extension, and a trailing dot
/// (`scan.`) counts as an empty one.
pub fn output_name(original: &str, format: TargetFormat) -> String {
    let ext = format.extension();
    let file = file_component(original);

    match file.rfind('.') {
        Some(dot) => format!("{}.{}", &file[..dot], ext),
        None => format!("{file}.{ext}"),
    }
}

/// Add ` (n)` before the extension: `b.webp` → `b (1).webp`.
pub fn with_counter(name: &str, n: usize) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{} ({n}){}", &name[..dot], &name[dot..]),
        _ => format!("{name} ({n})"),
    }
}

/// `true` when `name` is one plain file name: non-empty, no separators, not
/// `.` or `..`.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

/// Text after the last `/` or `\`; Windows drive prefixes (`C:`) go too.
fn file_component(name: &str) -> &str {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match file.split_once(':') {
        Some((drive, rest)) if drive.len() == 1 => rest,
        _ => file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_final_extension() {
        assert_eq!(output_name("a.jpg", TargetFormat::Webp), "a.webp");
        assert_eq!(output_name("b.png", TargetFormat::Jpeg), "b.jpeg");
        assert_eq!(output_name("archive.tar.gz", TargetFormat::Png), "archive.tar.png");
    }

    #[test]
    fn appends_when_no_extension() {
        assert_eq!(output_name("scan", TargetFormat::Avif), "scan.avif");
        assert_eq!(output_name("photos.v2/cat", TargetFormat::Webp), "cat.webp");
    }

    #[test]
    fn edge_dots() {
        assert_eq!(output_name("scan.", TargetFormat::Png), "scan.png");
        assert_eq!(output_name(".hidden", TargetFormat::Svg), ".svg");
        assert_eq!(output_name("dir\\shot.bmp", TargetFormat::Jpeg), "shot.jpeg");
    }

    #[test]
    fn counter_goes_before_extension() {
        assert_eq!(with_counter("b.webp", 1), "b (1).webp");
        assert_eq!(with_counter("scan", 2), "scan (2)");
        assert_eq!(with_counter(".svg", 1), ".svg (1)");
        assert_eq!(with_counter("b.tar.webp", 3), "b.tar (3).webp");
    }

    #[test]
    fn directories_never_reach_the_output_name() {
        for (input, expected) in [
            ("../escaped.png", "escaped.webp"),
            ("/etc/passwd", "passwd.webp"),
            ("..\\..\\win.bmp", "win.webp"),
            ("C:evil.png", "evil.webp"),
            ("..", "..webp"),
            ("dir/", ".webp"),
        ] {
            let name = output_name(input, TargetFormat::Webp);
            assert_eq!(name, expected, "{input}");
            assert!(is_plain_file_name(&name), "{input} -> {name}");
        }
    }

    #[test]
    fn plain_file_name_rules() {
        assert!(is_plain_file_name("a.webp"));
        assert!(is_plain_file_name("b (1).webp"));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("../a.webp"));
        assert!(!is_plain_file_name("/abs.webp"));
        assert!(!is_plain_file_name("dir\\a.webp"));
    }
}
