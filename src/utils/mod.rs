mod atomic;

pub use atomic::write_atomic;

pub fn pluralize(count: usize, singular: &str, plural: Option<&str>) -> String {
    if count == 1 {
        return singular.to_string();
    }

    match plural {
        Some(p) => p.to_string(),
        None => format!("{singular}s"),
    }
}

/// Show the first and last few characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
