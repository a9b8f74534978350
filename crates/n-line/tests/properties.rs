//! Property-based tests for the line buffer and history navigation.

use std::sync::Arc;

use n_line::history::{HistoryNav, HistoryStore, MemoryHistory, Step};
use n_line::line::LineBuffer;
use n_term::unit::{ByteUnits, UnitAdapter, Utf8Units};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Edit {
    Insert(String),
    Backspace,
    Delete,
    Left,
    Right,
    WordLeft,
    WordRight,
    KillWord,
    Transpose,
    Cursor(usize),
}

fn edit() -> impl Strategy<Value = Edit> {
    // Multi-byte, wide and combining units on purpose. Regional indicators,
    // Hangul jamo and tabs let a deletion fuse the units on either side.
    let text = prop::sample::select(vec![
        "a", "é", "漢", "e\u{301}", "\u{301}", " ", "🦀", "ab", "🇦", "🇧", "\u{1100}", "\u{1161}",
        "\u{11A8}", "\t",
    ]);
    prop_oneof![
        4 => text.prop_map(|s| Edit::Insert(s.to_owned())),
        2 => Just(Edit::Backspace),
        1 => Just(Edit::Delete),
        2 => Just(Edit::Left),
        2 => Just(Edit::Right),
        1 => Just(Edit::WordLeft),
        1 => Just(Edit::WordRight),
        1 => Just(Edit::KillWord),
        1 => Just(Edit::Transpose),
        1 => (0usize..64).prop_map(Edit::Cursor),
    ]
}

fn apply(buf: &mut LineBuffer, edit: &Edit) {
    match edit {
        Edit::Insert(s) => {
            let _ = buf.insert_at_cursor(s.as_bytes());
        }
        Edit::Backspace => {
            buf.delete_before_cursor();
        }
        Edit::Delete => {
            buf.delete_at_cursor();
        }
        Edit::Left => {
            buf.move_left();
        }
        Edit::Right => {
            buf.move_right();
        }
        Edit::WordLeft => {
            buf.move_word_left();
        }
        Edit::WordRight => {
            buf.move_word_right();
        }
        Edit::KillWord => {
            buf.delete_word_before_cursor();
        }
        Edit::Transpose => {
            buf.transpose();
        }
        Edit::Cursor(pos) => buf.set_cursor(*pos),
    }
}

proptest! {
    // The cursor never splits a unit and the content stays valid UTF-8.
    #[test]
    fn cursor_stays_on_unit_boundary(edits in prop::collection::vec(edit(), 0..100)) {
        let adapter: Arc<dyn UnitAdapter> = Arc::new(Utf8Units);
        let mut buf = LineBuffer::new(adapter, 48);
        for e in &edits {
            apply(&mut buf, e);
            prop_assert!(buf.cursor() <= buf.len());
            prop_assert!(buf.len() <= buf.capacity());
            prop_assert!(buf.is_boundary(buf.cursor()), "cursor {} splits {:?}", buf.cursor(), buf);
            prop_assert!(std::str::from_utf8(buf.as_bytes()).is_ok());
        }
    }

    // With the byte adapter every position is a boundary and edits move
    // exactly one byte.
    #[test]
    fn byte_units_move_one_byte(edits in prop::collection::vec(edit(), 0..60)) {
        let adapter: Arc<dyn UnitAdapter> = Arc::new(ByteUnits);
        let mut buf = LineBuffer::new(adapter, 48);
        for e in &edits {
            let before = (buf.len(), buf.cursor());
            apply(&mut buf, e);
            match e {
                Edit::Backspace if before.1 > 0 => prop_assert_eq!(buf.len(), before.0 - 1),
                Edit::Left if before.1 > 0 => prop_assert_eq!(buf.cursor(), before.1 - 1),
                Edit::Right if before.1 < before.0 => prop_assert_eq!(buf.cursor(), before.1 + 1),
                _ => {}
            }
        }
    }

    // Browsing away and back restores the live line byte for byte.
    #[test]
    fn history_round_trip(
        entries in prop::collection::vec("[a-z ]{1,8}", 0..10),
        live in "[a-z]{0,8}",
        depth in 0usize..12,
    ) {
        let mut store = MemoryHistory::new(100);
        for e in &entries {
            store.add(e);
        }
        let mut nav = HistoryNav::new();
        let mut shown = live.clone();
        let mut moved = 0;
        for _ in 0..depth {
            match nav.step(&mut store, Step::Older, &shown) {
                Some(text) => {
                    shown = text;
                    moved += 1;
                }
                None => break,
            }
        }
        prop_assert!(moved <= store.count());
        for _ in 0..moved {
            shown = nav.step(&mut store, Step::Newer, &shown).unwrap();
        }
        prop_assert!(nav.at_live());
        prop_assert_eq!(shown, live);
    }
}

#[test]
fn boundary_moves_are_no_ops() {
    let adapter: Arc<dyn UnitAdapter> = Arc::new(Utf8Units);
    let mut buf = LineBuffer::new(adapter, 16);
    assert!(!buf.move_left());
    assert!(!buf.delete_before_cursor());
    buf.insert_at_cursor("héllo".as_bytes()).unwrap();
    assert!(!buf.move_right());
    assert!(!buf.delete_at_cursor());
    assert_eq!(buf.to_string_lossy(), "héllo");
}
