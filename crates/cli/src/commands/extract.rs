use unbake_core::decompile::extract_cmd;

/// Print the instruction line recovered from one `created_by` value.
///
/// Prints nothing when no instruction is recognized.
pub fn extract_command(created_by: &str) {
    let line = extract_cmd(created_by);
    if !line.is_empty() {
        println!("{line}");
    }
}
