//! Routespec to Kubernetes resource name mapping
//!
//! Every route owns three objects that share one name. The name has to be
//! derivable from the routespec alone (it is how `delete_route` finds the
//! objects again), so the mapping is deterministic and must never change.

use std::fmt::Write;

use aws_lc_rs::digest;

/// Fixed prefix of every route resource name
pub const NAME_PREFIX: &str = "jupyter-";

/// Fixed suffix of every route resource name (before hashing)
pub const NAME_SUFFIX: &str = "-route";

/// Character introducing an escape sequence
pub const ESCAPE_CHAR: char = '-';

/// Maximum length of a DNS-1123 label
pub const MAX_NAME_LEN: usize = 63;

/// Number of hex digits of the SHA-256 kept when a name is truncated
pub const HASH_LEN: usize = 6;

/// Derive the resource name for a routespec.
///
/// Characters outside `[a-z0-9]` are escaped byte-wise as `-XX` (uppercase
/// hex), the result is wrapped in [`NAME_PREFIX`]/[`NAME_SUFFIX`], long
/// names are truncated with a hash suffix so they fit in a DNS label, and
/// the whole thing is lowercased. The hash is taken before lowercasing so
/// names of existing routes stay the same.
/// The output only contains `[a-z0-9-]`, starts with a letter, ends with a
/// letter or digit and is at most [`MAX_NAME_LEN`] bytes long.
pub fn safe_name(routespec: &str) -> String {
    let wrapped = format!("{}{}{}", NAME_PREFIX, escape(routespec), NAME_SUFFIX);
    hashed_slug(&wrapped, MAX_NAME_LEN, HASH_LEN).to_lowercase()
}

fn is_safe(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit()
}

/// Escape every character outside `[a-z0-9]`, one `-XX` group per UTF-8 byte.
///
/// The escape character itself is not safe, so the encoding is injective.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut buf = [0u8; 4];
    for c in s.chars() {
        if is_safe(c) {
            out.push(c);
            continue;
        }
        for b in c.encode_utf8(&mut buf).as_bytes() {
            let _ = write!(out, "{}{:02X}", ESCAPE_CHAR, b);
        }
    }
    out
}

/// Shorten `slug` to `limit` bytes, replacing the tail with a content hash.
///
/// Slugs that already fit (with room left for a hash) are returned as is.
/// The input is always ASCII here, so byte slicing is safe.
fn hashed_slug(slug: &str, limit: usize, hash_length: usize) -> String {
    if slug.len() < limit - hash_length {
        return slug.to_string();
    }
    let hash = sha256_hex(slug);
    format!(
        "{}-{}",
        &slug[..limit - hash_length - 1],
        &hash[..hash_length]
    )
}

fn sha256_hex(input: &str) -> String {
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    hash.as_ref()
        .iter()
        .fold(String::with_capacity(64), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    fn assert_dns_label(name: &str) {
        assert!(!name.is_empty());
        assert!(name.len() <= MAX_NAME_LEN, "{} is too long", name);
        assert!(
            name.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
            "{} has characters outside [a-z0-9-]",
            name
        );
        assert!(name.starts_with(|c: char| c.is_ascii_lowercase()));
        assert!(name.ends_with(|c: char| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn short_routespec_is_escaped_not_hashed() {
        assert_eq!(safe_name("/"), "jupyter--2f-route");
        assert_eq!(safe_name("/user/alice/"), "jupyter--2fuser-2falice-2f-route");
    }

    #[test]
    fn uppercase_and_escape_char_are_escaped() {
        assert_eq!(safe_name("A"), "jupyter--41-route");
        assert_eq!(safe_name("-"), "jupyter--2d-route");
        // "é" is two UTF-8 bytes
        assert_eq!(safe_name("é"), "jupyter--c3-a9-route");
    }

    #[test]
    fn long_routespec_is_hashed_and_bounded() {
        let routespec = format!("/user/{}/", "a".repeat(200));
        let name = safe_name(&routespec);
        assert_eq!(name.len(), MAX_NAME_LEN);
        assert_dns_label(&name);
        assert!(name.starts_with("jupyter--2fuser-2faaaa"));
    }

    #[test]
    fn long_routespecs_with_shared_prefix_differ() {
        let base = format!("/user/{}", "b".repeat(100));
        let a = safe_name(&format!("{}/one", base));
        let b = safe_name(&format!("{}/two", base));
        assert_ne!(a, b);
        assert_eq!(a[..MAX_NAME_LEN - HASH_LEN], b[..MAX_NAME_LEN - HASH_LEN]);
    }

    #[test]
    fn deterministic_across_calls() {
        for r in ["/", "/user/bob", "host.example.com/path", ""] {
            assert_eq!(safe_name(r), safe_name(r));
        }
    }

    #[test]
    fn distinct_routespecs_get_distinct_names() {
        let mut specs: Vec<String> = (0..2000).map(|i| format!("/user/u{}/", i)).collect();
        specs.extend((0..100).map(|i| format!("/user/{}{}/", "x".repeat(80), i)));
        specs.push("/A".to_string());
        specs.push("/a".to_string());
        specs.push("/-41".to_string());

        let names: HashSet<String> = specs.iter().map(|s| safe_name(s)).collect();
        assert_eq!(names.len(), specs.len());
    }

    #[rstest]
    #[case::empty("")]
    #[case::root("/")]
    #[case::host_route("jupyter.example.com/user/alice/")]
    #[case::unicode("/user/Łukasz-日本語/")]
    #[case::emoji("/🚀/")]
    #[case::whitespace("/user/with space\t/")]
    #[case::trailing_dash("/user/x-")]
    fn output_is_always_a_valid_resource_name(#[case] routespec: &str) {
        assert_dns_label(&safe_name(routespec));
    }

    #[test]
    fn long_unicode_routespec_is_a_valid_resource_name() {
        let routespec = "/ü".repeat(40);
        assert_dns_label(&safe_name(&routespec));
    }

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
