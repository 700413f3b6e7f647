// shared/tests/auto_update.rs — auto-update across the redundant store

use bootguard_env::{
    EnvAction, EnvRecord, EnvSession, Journal, Location, MemSlotStore, SessionTarget, SlotSelector,
    Ustate,
};
use pretty_assertions::assert_eq;

fn slot(revision: u32, kernel: &str) -> EnvRecord {
    let mut journal = Journal::new();
    journal.push(EnvAction::set_str("kernelfile", kernel)).unwrap();
    journal.push(EnvAction::set_str("watchdog_timeout_sec", "30")).unwrap();
    journal.push(EnvAction::set_str("board", "rev-c")).unwrap();
    let mut record = EnvRecord { revision, ..EnvRecord::blank() };
    assert!(journal.drain_and_apply(&mut record, &mut bootguard_env::RecordState).is_clean());
    record
}

#[test]
fn auto_update_overwrites_oldest_and_keeps_latest() {
    let mut store = MemSlotStore::from_records([slot(2, "vmlinuz-4"), slot(5, "vmlinuz-4.9")]);
    let untouched = store.raw(1).to_vec();

    let mut journal = Journal::new();
    journal.push(EnvAction::set_str("kernelfile", "vmlinuz-5")).unwrap();
    journal.push(EnvAction::set_str("ustate", "2")).unwrap();

    let mut session = EnvSession::new(&mut store);
    let outcome = session.update(SessionTarget::AutoUpdate, &mut journal).unwrap();
    session.finalize().unwrap();

    assert!(outcome.report.is_clean());
    assert!(journal.is_empty());
    assert_eq!(outcome.location, Location::Slot(0));
    assert_eq!(store.writes(), &[0]);
    assert_eq!(store.raw(1), untouched.as_slice());

    let written = EnvRecord::decode(store.raw(0)).unwrap();
    assert_eq!(written, outcome.record);
    assert_eq!(written.revision, 6);
    assert_eq!(written.kernel_file.to_narrow(), "vmlinuz-5");
    assert_eq!(written.ustate, Ustate::Testing.as_u16());

    // everything the journal did not touch is carried over from the latest slot
    assert_eq!(written.watchdog_timeout_sec, 30);
    let board = written.user_vars.get("board").unwrap().unwrap();
    assert_eq!(board.format_value().unwrap(), "rev-c");
}

#[test]
fn repeated_auto_updates_alternate_slots() {
    let mut store = MemSlotStore::from_records([slot(2, "a"), slot(5, "b")]);
    for (expected_slot, expected_revision) in [(0, 6), (1, 7), (0, 8)] {
        let mut journal = Journal::new();
        let outcome =
            EnvSession::new(&mut store).update(SessionTarget::AutoUpdate, &mut journal).unwrap();
        assert_eq!(outcome.location, Location::Slot(expected_slot));
        assert_eq!(outcome.record.revision, expected_revision);
    }
    let selector = SlotSelector::scan(&mut store);
    assert_eq!(selector.select_latest().unwrap(), 0);
    assert_eq!(selector.select_oldest().unwrap(), 1);
}

#[test]
fn corrupt_oldest_is_ignored_for_selection() {
    let mut damaged = slot(9, "old").encode();
    damaged[100] ^= 0x01;
    let mut store = MemSlotStore::from_raw(vec![damaged, slot(3, "good").encode()]);

    let outcome = EnvSession::new(&mut store)
        .update(SessionTarget::AutoUpdate, &mut Journal::new())
        .unwrap();
    assert_eq!(outcome.location, Location::Slot(0));
    assert_eq!(outcome.record.revision, 4);
    assert_eq!(outcome.record.kernel_file.to_narrow(), "good");
}
