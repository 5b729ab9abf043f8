//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Trimmed, lower-cased form used for lenient answer comparison.
pub fn normalize_answer(s: &str) -> String {
  s.trim().to_lowercase()
}

/// All ASCII digits of `s`, in order ("Ush 1,500" -> "1500").
pub fn digits_of(s: &str) -> String {
  s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", head, s.len())
  }
}

/// Pull the first `{...}` object out of a model reply that may wrap it in prose or code fences.
pub fn extract_json_object(text: &str) -> Option<&str> {
  let start = text.find('{')?;
  let end = text.rfind('}')?;
  if end < start { None } else { Some(&text[start..=end]) }
}
