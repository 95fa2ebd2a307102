use crate::instructions::is_keyword_prefixed;

/// Marker some builders put in `created_by` in front of the literal
/// instruction text (`/bin/sh -c #(nop)  CMD ["nginx"]`).
pub const NOP_MARKER: &str = "#(nop) ";

/// Default shell the classic builder wraps RUN commands in.
pub const SHELL_WRAPPER: &str = "/bin/sh -c ";

/// Recover a canonical instruction line from a raw `created_by` string.
///
/// Rules, first match wins:
/// 1. no-op marker at a byte index greater than 0: the text after the marker
/// 2. shell wrapper anywhere: `RUN ` followed by the text after the wrapper
/// 3. already starts with an instruction keyword: unchanged
/// 4. otherwise the empty string (nothing recoverable)
///
/// A marker at index 0 does not count as a match for rule 1; such strings fall
/// through to the later rules.
pub fn extract_cmd(raw: &str) -> String {
    if let Some(idx) = raw.find(NOP_MARKER).filter(|&idx| idx > 0) {
        return raw[idx + NOP_MARKER.len()..].to_string();
    }
    if let Some(idx) = raw.find(SHELL_WRAPPER) {
        return format!("RUN {}", &raw[idx + SHELL_WRAPPER.len()..]);
    }
    if is_keyword_prefixed(raw) {
        return raw.to_string();
    }
    String::new()
}
