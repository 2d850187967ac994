//! Membership Module Tests
//!
//! Validates reconciliation, the checksum, dissemination bounds, and the
//! probe iterator.
//!
//! ## Test Scopes
//! - **Reconciliation**: incarnation/precedence acceptance rules, refutation
//!   of rumors about the local node, idempotent inserts.
//! - **Checksum**: determinism and agreement with an independent recompute.
//! - **Dissemination**: piggyback bounds, ordering, and cap adjustment.

#[cfg(test)]
mod tests {
    use crate::membership::dissemination::Dissemination;
    use crate::membership::table::Membership;
    use crate::membership::types::{
        Change, MemberAddr, MemberStatus, UpdateKind,
    };

    fn addr(s: &str) -> MemberAddr {
        MemberAddr::new(s)
    }

    /// Table whose local member is alive at incarnation 1.
    fn local_table() -> Membership {
        let table = Membership::new(addr("127.0.0.1:3000"));
        table.make_alive(addr("127.0.0.1:3000"), 1);
        table
    }

    fn change(a: &str, status: MemberStatus, incarnation: u64) -> Change {
        Change::new(addr(a), status, incarnation, Some(addr("10.0.0.9:9999")))
    }

    // ============================================================
    // STATUS PRECEDENCE
    // ============================================================

    #[test]
    fn test_status_precedence_ordering() {
        assert!(MemberStatus::Alive.precedence() < MemberStatus::Suspect.precedence());
        assert!(MemberStatus::Suspect.precedence() < MemberStatus::Faulty.precedence());
        assert_eq!(
            MemberStatus::Faulty.precedence(),
            MemberStatus::Leave.precedence()
        );
        assert_eq!(
            MemberStatus::Faulty.precedence(),
            MemberStatus::Damped.precedence()
        );
    }

    #[test]
    fn test_pingable_statuses() {
        assert!(MemberStatus::Alive.is_pingable());
        assert!(MemberStatus::Suspect.is_pingable());
        assert!(!MemberStatus::Faulty.is_pingable());
        assert!(!MemberStatus::Leave.is_pingable());
        assert!(!MemberStatus::Damped.is_pingable());
    }

    // ============================================================
    // RECONCILIATION
    // ============================================================

    #[test]
    fn test_first_observation_emits_new() {
        let table = local_table();
        let applied = table.update(&[change("10.0.0.1:3000", MemberStatus::Faulty, 7)]);

        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].kind, UpdateKind::New);
        let member = table.get(&addr("10.0.0.1:3000")).unwrap();
        assert_eq!(member.status, MemberStatus::Faulty);
        assert_eq!(member.incarnation_number, 7);
    }

    #[test]
    fn test_higher_incarnation_wins() {
        let table = local_table();
        table.update(&[change("10.0.0.1:3000", MemberStatus::Alive, 5)]);

        // Suspect at a higher incarnation overrides alive.
        let applied = table.update(&[change("10.0.0.1:3000", MemberStatus::Suspect, 6)]);
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].kind, UpdateKind::Suspect);

        // Alive at an even higher incarnation overrides suspect.
        let applied = table.update(&[change("10.0.0.1:3000", MemberStatus::Alive, 7)]);
        assert_eq!(applied.len(), 1);
        assert_eq!(
            table.get(&addr("10.0.0.1:3000")).unwrap().status,
            MemberStatus::Alive
        );
    }

    #[test]
    fn test_lower_incarnation_rejected() {
        let table = local_table();
        table.update(&[change("10.0.0.1:3000", MemberStatus::Alive, 5)]);

        let applied = table.update(&[change("10.0.0.1:3000", MemberStatus::Faulty, 4)]);
        assert!(applied.is_empty());
        assert_eq!(
            table.get(&addr("10.0.0.1:3000")).unwrap().status,
            MemberStatus::Alive
        );
    }

    #[test]
    fn test_same_incarnation_precedence() {
        let table = local_table();
        table.update(&[change("10.0.0.1:3000", MemberStatus::Alive, 5)]);

        // Suspect beats alive at the same incarnation.
        let applied = table.update(&[change("10.0.0.1:3000", MemberStatus::Suspect, 5)]);
        assert_eq!(applied.len(), 1);

        // The reverse is never accepted.
        let applied = table.update(&[change("10.0.0.1:3000", MemberStatus::Alive, 5)]);
        assert!(applied.is_empty());
        assert_eq!(
            table.get(&addr("10.0.0.1:3000")).unwrap().status,
            MemberStatus::Suspect
        );
    }

    #[test]
    fn test_equal_precedence_rejected() {
        let table = local_table();
        table.update(&[change("10.0.0.1:3000", MemberStatus::Faulty, 5)]);

        // Leave and faulty share precedence, so neither overrides the other
        // at the same incarnation.
        let applied = table.update(&[change("10.0.0.1:3000", MemberStatus::Leave, 5)]);
        assert!(applied.is_empty());
    }

    #[test]
    fn test_add_member_idempotent() {
        let table = local_table();

        let first = table.add_member(addr("10.0.0.1:3000"), Some(42));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, UpdateKind::New);

        let second = table.add_member(addr("10.0.0.1:3000"), Some(42));
        assert!(second.is_empty(), "no second `new` for a known address");
    }

    #[test]
    fn test_update_with_own_state_is_noop() {
        let table = local_table();
        table.update(&[
            change("10.0.0.1:3000", MemberStatus::Alive, 5),
            change("10.0.0.2:3000", MemberStatus::Suspect, 3),
        ]);

        let echoes: Vec<Change> = table
            .get_state()
            .iter()
            .map(|m| Change::new(m.address.clone(), m.status, m.incarnation_number, None))
            .collect();
        let applied = table.update(&echoes);
        assert!(applied.is_empty(), "replaying our own state changes nothing");
    }

    // ============================================================
    // REFUTATION
    // ============================================================

    #[test]
    fn test_refutes_suspect_rumor_about_local() {
        let table = local_table();

        let applied = table.update(&[change("127.0.0.1:3000", MemberStatus::Suspect, 5)]);

        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].kind, UpdateKind::Alive);
        let local = table.local_member().unwrap();
        assert_eq!(local.status, MemberStatus::Alive);
        assert_eq!(local.incarnation_number, 6, "bumped to max(1, 5) + 1");
    }

    #[test]
    fn test_refutes_faulty_rumor_at_equal_incarnation() {
        let table = local_table();

        let applied = table.update(&[change("127.0.0.1:3000", MemberStatus::Faulty, 1)]);

        assert_eq!(applied.len(), 1);
        let local = table.local_member().unwrap();
        assert_eq!(local.status, MemberStatus::Alive);
        assert_eq!(local.incarnation_number, 2);
    }

    #[test]
    fn test_stale_rumor_about_local_ignored() {
        let table = local_table();
        table.update(&[change("127.0.0.1:3000", MemberStatus::Alive, 9)]);

        let applied = table.update(&[change("127.0.0.1:3000", MemberStatus::Suspect, 3)]);
        assert!(applied.is_empty());
        assert_eq!(table.local_member().unwrap().incarnation_number, 9);
    }

    #[test]
    fn test_leave_about_local_is_accepted() {
        // An orderly departure is self-announced, not a rumor to refute.
        let table = local_table();
        let applied = table.update(&[Change::new(
            addr("127.0.0.1:3000"),
            MemberStatus::Leave,
            1,
            Some(addr("127.0.0.1:3000")),
        )]);

        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].kind, UpdateKind::Leave);
        assert_eq!(table.local_member().unwrap().status, MemberStatus::Leave);
    }

    // ============================================================
    // CHECKSUM
    // ============================================================

    #[test]
    fn test_checksum_matches_independent_recompute() {
        let table = local_table();
        table.update(&[
            change("10.0.0.1:3000", MemberStatus::Alive, 5),
            change("10.0.0.2:3000", MemberStatus::Suspect, 3),
            change("10.0.0.3:3000", MemberStatus::Faulty, 8),
        ]);

        assert_eq!(table.checksum(), table.compute_checksum());
    }

    #[test]
    fn test_checksum_is_order_independent() {
        let a = local_table();
        a.update(&[
            change("10.0.0.1:3000", MemberStatus::Alive, 5),
            change("10.0.0.2:3000", MemberStatus::Alive, 3),
        ]);

        let b = local_table();
        b.update(&[
            change("10.0.0.2:3000", MemberStatus::Alive, 3),
            change("10.0.0.1:3000", MemberStatus::Alive, 5),
        ]);

        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_checksum_tracks_every_mutation() {
        let table = local_table();
        let initial = table.checksum();

        table.update(&[change("10.0.0.1:3000", MemberStatus::Alive, 5)]);
        let after_add = table.checksum();
        assert_ne!(initial, after_add);

        table.update(&[change("10.0.0.1:3000", MemberStatus::Suspect, 5)]);
        assert_ne!(after_add, table.checksum());
    }

    // ============================================================
    // SAMPLING & PROBE ITERATOR
    // ============================================================

    #[test]
    fn test_random_pingable_members_excludes() {
        let table = local_table();
        table.update(&[
            change("10.0.0.1:3000", MemberStatus::Alive, 1),
            change("10.0.0.2:3000", MemberStatus::Alive, 1),
            change("10.0.0.3:3000", MemberStatus::Faulty, 1),
        ]);

        let sample = table.get_random_pingable_members(10, &[addr("10.0.0.1:3000")]);
        let addrs: Vec<String> = sample.iter().map(|m| m.address.0.clone()).collect();

        assert_eq!(addrs, vec!["10.0.0.2:3000"]);
    }

    #[test]
    fn test_random_pingable_members_returns_fewer_than_requested() {
        let table = local_table();
        table.update(&[change("10.0.0.1:3000", MemberStatus::Alive, 1)]);

        assert_eq!(table.get_random_pingable_members(5, &[]).len(), 1);
    }

    #[test]
    fn test_probe_iterator_covers_all_pingable_members() {
        let table = local_table();
        table.update(&[
            change("10.0.0.1:3000", MemberStatus::Alive, 1),
            change("10.0.0.2:3000", MemberStatus::Suspect, 1),
            change("10.0.0.3:3000", MemberStatus::Faulty, 1),
        ]);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..2 {
            seen.insert(table.next_probe_target().unwrap().address.0.clone());
        }

        // One full sweep visits each pingable member exactly once; faulty
        // and local members never appear.
        assert_eq!(seen.len(), 2);
        assert!(seen.contains("10.0.0.1:3000"));
        assert!(seen.contains("10.0.0.2:3000"));
    }

    #[test]
    fn test_probe_iterator_empty_when_nothing_pingable() {
        let table = local_table();
        table.update(&[change("10.0.0.1:3000", MemberStatus::Faulty, 1)]);

        assert!(table.next_probe_target().is_none());
    }

    // ============================================================
    // DISSEMINATION
    // ============================================================

    #[test]
    fn test_piggyback_bound_across_peers() {
        let dissemination = Dissemination::new();
        let cap = dissemination.max_piggyback_count();
        dissemination.record(change("10.0.0.1:3000", MemberStatus::Alive, 1));

        let mut carried = 0;
        for round in 0..(cap + 3) {
            let peer = addr(&format!("10.0.0.{}:4000", round));
            carried += dissemination
                .get_changes(None, 1, &peer)
                .len() as u32;
        }

        assert_eq!(carried, cap, "a change rides at most the cap, then drops");
        assert!(dissemination.is_empty());
    }

    #[test]
    fn test_checksum_agreement_suppresses_piggyback() {
        let dissemination = Dissemination::new();
        dissemination.record(change("10.0.0.1:3000", MemberStatus::Alive, 1));

        let agreed = dissemination.get_changes(Some(77), 77, &addr("10.0.0.2:4000"));
        assert!(agreed.is_empty());

        let disagreed = dissemination.get_changes(Some(76), 77, &addr("10.0.0.2:4000"));
        assert_eq!(disagreed.len(), 1);
    }

    #[test]
    fn test_changes_skip_their_source_peer() {
        let dissemination = Dissemination::new();
        dissemination.record(Change::new(
            addr("10.0.0.1:3000"),
            MemberStatus::Suspect,
            2,
            Some(addr("10.0.0.7:4000")),
        ));

        let to_source = dissemination.get_changes(None, 1, &addr("10.0.0.7:4000"));
        assert!(to_source.is_empty(), "never echo a change to its origin");

        let to_other = dissemination.get_changes(None, 1, &addr("10.0.0.8:4000"));
        assert_eq!(to_other.len(), 1);
    }

    #[test]
    fn test_least_disseminated_goes_first() {
        let dissemination = Dissemination::new();
        dissemination.adjust_max_piggyback(20);
        dissemination.record(change("10.0.0.1:3000", MemberStatus::Alive, 1));

        // Ride the first change once so the fresher one outranks it.
        dissemination.get_changes(None, 1, &addr("10.0.0.5:4000"));
        dissemination.record(change("10.0.0.2:3000", MemberStatus::Alive, 1));

        let batch = dissemination.get_changes(None, 1, &addr("10.0.0.6:4000"));
        assert_eq!(batch[0].address.0, "10.0.0.2:3000");
    }

    #[test]
    fn test_record_resets_piggyback_count() {
        let dissemination = Dissemination::new();
        dissemination.record(change("10.0.0.1:3000", MemberStatus::Alive, 1));
        dissemination.get_changes(None, 1, &addr("10.0.0.5:4000"));

        // A fresh change for the same address replaces the old entry and
        // starts disseminating from zero again.
        dissemination.record(change("10.0.0.1:3000", MemberStatus::Suspect, 2));
        let entry = dissemination.get(&addr("10.0.0.1:3000")).unwrap();
        assert_eq!(entry.piggyback_count, 0);
        assert_eq!(entry.status, MemberStatus::Suspect);
    }

    #[test]
    fn test_cap_adjusts_only_on_member_count_change() {
        let dissemination = Dissemination::new();

        // Same count, same cap: nothing fires.
        assert_eq!(dissemination.adjust_max_piggyback(1), None);
        // Count change that moves the cap fires once.
        assert_eq!(dissemination.adjust_max_piggyback(3), Some(4));
        // Re-announcing the same count stays quiet.
        assert_eq!(dissemination.adjust_max_piggyback(3), None);
        // Count change that happens to keep the cap is silent too.
        assert_eq!(dissemination.adjust_max_piggyback(2), None);
    }
}
