use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::{
    envelope::{decrypt, PasswordKey},
    relay::RelayEntry,
    types::{Message, MessageKind},
};

#[derive(Debug, Clone, Copy)]
pub struct Validator {
    window: Duration,
    tolerance_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub message: Message,
    pub received: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub examined: usize,
    pub reached_expired: bool,
    pub replays: usize,
    pub undecodable: usize,
    pub mismatched: usize,
    pub other_kind: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    pub accepted: Option<Accepted>,
    pub report: ScanReport,
}

impl ScanReport {
    pub fn log(&self) {
        if self.undecodable > 0 {
            warn!("invalid messages skipped: {}", self.undecodable);
        }
        debug!(
            "scanned {} entries: {} replays, {} timestamp mismatches, {} of another kind{}",
            self.examined,
            self.replays,
            self.mismatched,
            self.other_kind,
            if self.reached_expired {
                ", stopped at first expired entry"
            } else {
                ""
            }
        );
    }
}

impl Validator {
    pub fn new(window_s: u64, tolerance_ms: u64) -> Self {
        Self {
            window: Duration::seconds(i64::try_from(window_s).unwrap_or(i64::MAX / 1_000)),
            tolerance_ms: i64::try_from(tolerance_ms).unwrap_or(i64::MAX),
        }
    }

    pub fn latest(
        &self,
        key: &PasswordKey,
        entries: &[RelayEntry],
        wanted: MessageKind,
        now: DateTime<Utc>,
    ) -> Scan {
        let mut report = ScanReport::default();

        for (idx, entry) in entries.iter().enumerate() {
            if now - entry.created > self.window {
                report.reached_expired = true;
                break;
            }
            report.examined += 1;

            if let Some(nonce) = entry.content.nonce.as_deref() {
                let replayed = entries[idx + 1..]
                    .iter()
                    .any(|older| older.content.nonce.as_deref() == Some(nonce));
                if replayed {
                    warn!("duplicated nonce ({nonce}): possible replay attack, ignoring");
                    report.replays += 1;
                    continue;
                }
            }

            let message = match decrypt(key, &entry.content) {
                Ok(message) => message,
                Err(err) => {
                    debug!("cannot decrypt entry created {}: {err}", entry.created);
                    report.undecodable += 1;
                    continue;
                }
            };

            let drift_ms = (entry.created - message.timestamp()).num_milliseconds().abs();
            if drift_ms > self.tolerance_ms {
                warn!("message timestamps mismatch by {drift_ms} ms, ignoring");
                report.mismatched += 1;
                continue;
            }

            if message.kind() != wanted {
                report.other_kind += 1;
                continue;
            }

            return Scan {
                accepted: Some(Accepted {
                    message,
                    received: entry.created,
                }),
                report,
            };
        }

        Scan {
            accepted: None,
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        envelope::{encrypt, Envelope},
        types::{Command, Status},
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 7, 0, 0).unwrap()
    }

    fn key() -> PasswordKey {
        PasswordKey::from_passphrase("shared secret")
    }

    fn command(id: &str, at: DateTime<Utc>) -> Message {
        Message::Command(Command {
            timestamp: at,
            id: id.to_string(),
            program: Some(Vec::new()),
            override_program: None,
            from: None,
        })
    }

    fn status(at: DateTime<Utc>) -> Message {
        Message::Status(Status {
            timestamp: at,
            status: false,
            actual_status: false,
            target_temp: None,
            temp: None,
            humi: None,
            msgexp_s: 300,
            msgupd_s: 60,
            program: Vec::new(),
            override_program: None,
            name: "boiler".to_string(),
            lastcmd_id: None,
        })
    }

    fn entry(message: &Message, created: DateTime<Utc>) -> RelayEntry {
        RelayEntry {
            created,
            content: encrypt(&key(), message).unwrap(),
        }
    }

    fn command_id(scan: &Scan) -> Option<&str> {
        match scan.accepted.as_ref().map(|a| &a.message) {
            Some(Message::Command(command)) => Some(command.id.as_str()),
            _ => None,
        }
    }

    fn validator() -> Validator {
        Validator::new(600, 30_000)
    }

    #[test]
    fn accepts_newest_fresh_command() {
        let at = now() - Duration::seconds(10);
        let older = now() - Duration::seconds(20);
        let entries = vec![entry(&command("new", at), at), entry(&command("old", older), older)];

        let scan = validator().latest(&key(), &entries, MessageKind::Command, now());

        assert_eq!(command_id(&scan), Some("new"));
        assert_eq!(scan.accepted.unwrap().received, at);
        assert_eq!(scan.report.examined, 1);
    }

    #[test]
    fn skips_other_kinds_until_a_command() {
        let t1 = now() - Duration::seconds(5);
        let t2 = now() - Duration::seconds(50);
        let entries = vec![entry(&status(t1), t1), entry(&command("cmd", t2), t2)];

        let scan = validator().latest(&key(), &entries, MessageKind::Command, now());

        assert_eq!(command_id(&scan), Some("cmd"));
        assert_eq!(scan.report.other_kind, 1);
    }

    #[test]
    fn newer_duplicate_nonce_is_a_replay() {
        let original_at = now() - Duration::seconds(60);
        let original = entry(&command("genuine", original_at), original_at);
        let replay = RelayEntry {
            created: now() - Duration::seconds(1),
            content: original.content.clone(),
        };

        let scan = validator().latest(&key(), &[replay, original], MessageKind::Command, now());

        assert_eq!(command_id(&scan), Some("genuine"));
        assert_eq!(scan.report.replays, 1);
        assert_eq!(scan.report.mismatched, 0);
    }

    #[test]
    fn replay_check_covers_expired_older_entries() {
        let ancient_at = now() - Duration::seconds(3_600);
        let ancient = entry(&command("ancient", ancient_at), ancient_at);
        let replay = RelayEntry {
            created: now(),
            content: ancient.content.clone(),
        };

        let scan = validator().latest(&key(), &[replay, ancient], MessageKind::Command, now());

        assert!(scan.accepted.is_none());
        assert_eq!(scan.report.replays, 1);
        assert!(scan.report.reached_expired);
    }

    #[test]
    fn stops_at_first_expired_entry_without_decrypting() {
        let stale_at = now() - Duration::seconds(601);
        let garbage = RelayEntry {
            created: stale_at,
            content: Envelope {
                nonce: Some("AAAAAAAAAAAAAAAAAAAAAA==".to_string()),
                payload: Some("AAAA".to_string()),
            },
        };
        let valid_but_older = entry(&command("old", stale_at), stale_at - Duration::seconds(1));

        let scan = validator().latest(
            &key(),
            &[garbage, valid_but_older],
            MessageKind::Command,
            now(),
        );

        assert!(scan.accepted.is_none());
        assert_eq!(
            scan.report,
            ScanReport {
                reached_expired: true,
                ..ScanReport::default()
            }
        );
    }

    #[test]
    fn undecodable_entries_are_skipped_not_fatal() {
        let at = now() - Duration::seconds(30);
        let foreign = RelayEntry {
            created: now() - Duration::seconds(2),
            content: encrypt(
                &PasswordKey::from_passphrase("someone else"),
                &command("x", now()),
            )
            .unwrap(),
        };
        let unrelated = RelayEntry {
            created: now() - Duration::seconds(1),
            content: Envelope::default(),
        };

        let scan = validator().latest(
            &key(),
            &[unrelated, foreign, entry(&command("mine", at), at)],
            MessageKind::Command,
            now(),
        );

        assert_eq!(command_id(&scan), Some("mine"));
        assert_eq!(scan.report.undecodable, 2);
    }

    #[test]
    fn declared_time_far_from_receipt_is_rejected() {
        let declared = now() - Duration::seconds(300);
        let received = now() - Duration::seconds(5);

        let scan = validator().latest(
            &key(),
            &[entry(&command("moved", declared), received)],
            MessageKind::Command,
            now(),
        );

        assert!(scan.accepted.is_none());
        assert_eq!(scan.report.mismatched, 1);
    }

    #[test]
    fn drift_within_tolerance_is_fine() {
        let declared = now() - Duration::seconds(20);
        let received = now() - Duration::seconds(5);

        let scan = validator().latest(
            &key(),
            &[entry(&command("late", declared), received)],
            MessageKind::Command,
            now(),
        );

        assert_eq!(command_id(&scan), Some("late"));
    }

    #[test]
    fn entry_without_nonce_is_unique_but_undecodable() {
        let at = now() - Duration::seconds(1);
        let mut stripped = entry(&command("stripped", at), at);
        stripped.content.nonce = None;
        let older_at = now() - Duration::seconds(2);
        let mut older_stripped = entry(&command("older", older_at), older_at);
        older_stripped.content.nonce = None;

        let scan = validator().latest(
            &key(),
            &[stripped, older_stripped],
            MessageKind::Command,
            now(),
        );

        assert_eq!(scan.report.replays, 0);
        assert_eq!(scan.report.undecodable, 2);
    }
}
