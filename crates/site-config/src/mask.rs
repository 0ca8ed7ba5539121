//! Masking of credentials for debug output.

/// Render a credential for logs without revealing it.
///
/// Values of up to 10 characters keep their first and last 3 characters,
/// longer ones their first and last 6. Absent or empty values render as
/// `missing`.
pub fn mask_secret(value: Option<&str>) -> String {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return "missing".to_string();
    };

    let chars: Vec<char> = value.chars().collect();
    let keep = if chars.len() <= 10 { 3 } else { 6 };
    let keep = keep.min(chars.len());

    let head: String = chars[..keep].iter().collect();
    let tail: String = chars[chars.len() - keep..].iter().collect();
    format!("{}...{}", head, tail)
}
