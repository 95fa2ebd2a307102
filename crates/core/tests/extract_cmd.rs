use proptest::prelude::*;
use proptest::sample::select;
use unbake_core::decompile::{extract_cmd, NOP_MARKER, SHELL_WRAPPER};
use unbake_core::instructions::INSTRUCTION_KEYWORDS;

#[test]
fn nop_marker_wins_over_shell_wrapper() {
    assert_eq!(extract_cmd("/bin/sh -c #(nop)  CMD [\"/app\"]"), " CMD [\"/app\"]");
}

#[test]
fn shell_wrapper_becomes_run() {
    assert_eq!(extract_cmd("/bin/sh -c apt-get update"), "RUN apt-get update");
}

#[test]
fn canonical_instruction_is_returned_unchanged() {
    assert_eq!(extract_cmd("ENV PATH=/usr/bin"), "ENV PATH=/usr/bin");
}

#[test]
fn opaque_annotation_yields_nothing() {
    assert_eq!(extract_cmd("some opaque build-tool annotation"), "");
    assert_eq!(extract_cmd(""), "");
}

#[test]
fn nop_marker_at_index_zero_is_not_a_match() {
    assert_eq!(extract_cmd("#(nop) CMD [\"sh\"]"), "");
    assert_eq!(extract_cmd("#(nop) /bin/sh -c echo hi"), "RUN echo hi");
}

#[test]
fn buildkit_style_history_is_recovered() {
    assert_eq!(
        extract_cmd("RUN /bin/sh -c apt-get update # buildkit"),
        "RUN apt-get update # buildkit"
    );
    assert_eq!(extract_cmd("WORKDIR /app"), "WORKDIR /app");
    assert_eq!(extract_cmd("COPY . . # buildkit"), "COPY . . # buildkit");
}

proptest! {
    #[test]
    fn nop_marker_after_start_returns_suffix(
        prefix in "[a-z/ -]{1,20}",
        suffix in ".*",
    ) {
        let raw = format!("{prefix}{NOP_MARKER}{suffix}");
        prop_assert_eq!(extract_cmd(&raw), suffix);
    }

    #[test]
    fn nop_marker_at_start_falls_through(rest in "[a-z0-9 ]{0,30}") {
        let raw = format!("{NOP_MARKER}{rest}");
        prop_assert_eq!(extract_cmd(&raw), "");

        let wrapped = format!("{NOP_MARKER}{SHELL_WRAPPER}{rest}");
        prop_assert_eq!(extract_cmd(&wrapped), format!("RUN {rest}"));
    }

    #[test]
    fn shell_wrapper_returns_run_line(
        prefix in "[a-z/]{0,10}",
        command in "[a-z0-9 &|;=.-]{0,40}",
    ) {
        let raw = format!("{prefix}{SHELL_WRAPPER}{command}");
        prop_assert_eq!(extract_cmd(&raw), format!("RUN {command}"));
    }

    #[test]
    fn keyword_prefixed_text_is_unchanged(
        keyword in select(INSTRUCTION_KEYWORDS.to_vec()),
        text in "[a-zA-Z0-9=_. \\[\\]\"-]{0,40}",
    ) {
        let raw = format!("{keyword}{text}");
        prop_assert_eq!(extract_cmd(&raw), raw.clone());
    }

    #[test]
    fn unrecognized_text_is_empty(raw in "[a-z0-9 .:=-]{0,40}") {
        prop_assert_eq!(extract_cmd(&raw), "");
    }
}
