//! Property-based tests for the payload codecs.
//!
//! - `pty-req` encode/parse roundtrip for arbitrary field values, including
//!   terminal types that are not UTF-8
//! - truncating a valid `pty-req` anywhere before the modes always fails
//! - parsing arbitrary bytes never panics

#![cfg(test)]

use bytes::Bytes;
use proptest::prelude::*;

use crate::pty::{encode_terminal_modes, PtyConfig};
use crate::window::WindowChange;

prop_compose! {
    fn arb_pty_config()(
        term in prop::collection::vec(any::<u8>(), 0..32),
        width_chars in any::<u32>(),
        height_rows in any::<u32>(),
        width_pixels in any::<u32>(),
        height_pixels in any::<u32>(),
        modes in prop::collection::vec((1u8..=160, any::<u32>()), 0..16),
    ) -> PtyConfig {
        PtyConfig {
            term: Bytes::from(term),
            width_chars,
            height_rows,
            width_pixels,
            height_pixels,
            terminal_modes: encode_terminal_modes(modes),
        }
    }
}

proptest! {
    #[test]
    fn pty_request_roundtrip(config in arb_pty_config()) {
        let parsed = PtyConfig::parse(&config.encode()).unwrap();
        prop_assert_eq!(parsed, config);
    }

    #[test]
    fn pty_request_truncation_fails(config in arb_pty_config(), cut in any::<prop::sample::Index>()) {
        let encoded = config.encode();
        let fixed_len = encoded.len() - config.terminal_modes.len();
        let len = cut.index(fixed_len);
        prop_assert!(PtyConfig::parse(&encoded[..len]).is_err());
    }

    #[test]
    fn pty_request_arbitrary_bytes(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = PtyConfig::parse(&data);
    }

    #[test]
    fn window_change_roundtrip(
        width_chars in any::<u32>(),
        height_rows in any::<u32>(),
        width_pixels in any::<u32>(),
        height_pixels in any::<u32>(),
    ) {
        let change = WindowChange { width_chars, height_rows, width_pixels, height_pixels };
        prop_assert_eq!(WindowChange::parse(&change.encode()).unwrap(), change);
    }

    #[test]
    fn opaque_modes_are_preserved(raw in prop::collection::vec(any::<u8>(), 0..64)) {
        let config = PtyConfig {
            term: Bytes::from_static(b"vt100"),
            width_chars: 80,
            height_rows: 24,
            width_pixels: 0,
            height_pixels: 0,
            terminal_modes: Bytes::from(raw),
        };
        prop_assert_eq!(PtyConfig::parse(&config.encode()).unwrap(), config);
    }
}
