//! Restartability and rendering properties of the corpus.
//!
//! An interrupted sync re-fetches its tail and reprocesses messages it
//! already wrote; these tests pin down that a re-run changes nothing a
//! reader could observe, and that hostile header values cannot break the
//! frontmatter or escape the account subtree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use maildeck::adapters::imap::FetchedMessage;
use maildeck::corpus::paths::CorpusPaths;
use maildeck::services::sync::SyncOps;

const ACCOUNT: &str = "me@gmail.com";

fn corpus(dir: &Path) -> CorpusPaths {
    CorpusPaths::new(Some(PathBuf::from(dir)))
}

fn fetched(uid: u64, raw: String) -> FetchedMessage {
    FetchedMessage {
        uid,
        raw: raw.into_bytes(),
        flags: vec![],
    }
}

/// Snapshot every file under the account subtree as path -> bytes.
fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut out = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                out.insert(rel, std::fs::read(&path).unwrap());
            }
        }
    }
    out
}

#[test]
fn rerunning_a_batch_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let paths = corpus(dir.path());
    let ops = SyncOps::new(paths.clone(), ACCOUNT);

    let batch = vec![
        fetched(
            11,
            "Message-ID: <m1@x>\r\nFrom: Alice <alice@example.com>\r\nTo: me@gmail.com\r\n\
Subject: Plans\r\nDate: Tue, 17 Feb 2026 09:00:00 +0000\r\n\
Content-Type: text/plain; charset=UTF-8\r\n\r\nLet's sync Friday.\r\n"
                .to_string(),
        ),
        fetched(
            12,
            "Message-ID: <m2@x>\r\nIn-Reply-To: <m1@x>\r\nFrom: me@gmail.com\r\n\
To: alice@example.com\r\nSubject: Re: Plans\r\nDate: Tue, 17 Feb 2026 09:30:00 +0000\r\n\
Content-Type: text/plain; charset=UTF-8\r\n\r\nFriday works.\r\n"
                .to_string(),
        ),
    ];

    ops.process_batch(&batch, true).unwrap();
    let first = snapshot(&paths.account_dir(ACCOUNT));

    ops.process_batch(&batch, true).unwrap();
    let second = snapshot(&paths.account_dir(ACCOUNT));

    assert_eq!(first.keys().collect::<Vec<_>>(), second.keys().collect::<Vec<_>>());
    for (path, bytes) in &first {
        // Contact sighting counts inflate when the same batch is
        // re-fetched; everything else must be byte-identical.
        if path.ends_with("contacts.jsonl") {
            continue;
        }
        assert_eq!(bytes, &second[path], "{path} changed on re-run");
    }
}

#[test]
fn hostile_subject_and_filenames_are_contained() {
    let dir = tempfile::tempdir().unwrap();
    let paths = corpus(dir.path());
    let ops = SyncOps::new(paths.clone(), ACCOUNT);

    let raw = "Message-ID: <../../evil@x>\r\nFrom: \"Eve: [attacker]\" <eve@example.com>\r\n\
To: me@gmail.com\r\nSubject: fees: {due} #now | -urgent\r\n\
Date: Tue, 17 Feb 2026 09:00:00 +0000\r\nMIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"Z\"\r\n\r\n\
--Z\r\nContent-Type: text/plain; charset=UTF-8\r\n\r\nPay up.\r\n\
--Z\r\nContent-Type: text/plain; name=\"../../../etc/cron.txt\"\r\n\
Content-Disposition: attachment; filename=\"../../../etc/cron.txt\"\r\n\r\nboom\r\n\
--Z--\r\n"
        .to_string();

    ops.process_batch(&[fetched(31, raw)], true).unwrap();

    let account_root = paths.account_dir(ACCOUNT);

    // Nothing may exist outside the account subtree.
    let outside = dir.path().join("etc");
    assert!(!outside.exists());

    // The attachment landed inside the thread, its name sanitized.
    let snap = snapshot(&account_root);
    let attachment = snap
        .keys()
        .find(|k| k.contains("attachments/"))
        .expect("attachment written");
    assert!(!attachment.contains(".."));

    // The frontmatter survived the YAML-hostile subject and sender.
    let message = snap
        .iter()
        .find(|(k, _)| k.ends_with(".md"))
        .map(|(_, v)| String::from_utf8_lossy(v).into_owned())
        .expect("message written");
    assert!(message.starts_with("---\n"));
    assert!(message.contains("from: \"Eve: [attacker] <eve@example.com>\""));
    assert!(message.contains("Pay up."));

    // Index line still parses and carries the subject verbatim.
    let threads =
        maildeck::corpus::jsonl::read_all(&paths.threads_index(ACCOUNT)).unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0]["subject"], "fees: {due} #now | -urgent");
}

#[test]
fn owner_and_external_roles_use_gmail_normalization() {
    let dir = tempfile::tempdir().unwrap();
    let paths = corpus(dir.path());
    let ops = SyncOps::new(paths.clone(), ACCOUNT);

    // Dotted/plus-tagged forms of the owner address count as self.
    let raw = "Message-ID: <r1@x>\r\nFrom: Alice <alice@example.com>\r\n\
To: M.E+label@gmail.com\r\nCc: bob@example.com\r\n\
Subject: Roles\r\nDate: Tue, 17 Feb 2026 09:00:00 +0000\r\n\
Content-Type: text/plain; charset=UTF-8\r\n\r\nChecking roles.\r\n"
        .to_string();

    ops.process_batch(&[fetched(41, raw)], true).unwrap();

    let snap = snapshot(&paths.account_dir(ACCOUNT));
    let meta = snap
        .iter()
        .find(|(k, _)| k.ends_with("thread.json"))
        .map(|(_, v)| serde_json::from_slice::<serde_json::Value>(v).unwrap())
        .expect("thread meta written");

    let roles: BTreeMap<String, String> = meta["participants"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| {
            (
                p["email"].as_str().unwrap().to_string(),
                p["role"].as_str().unwrap().to_string(),
            )
        })
        .collect();

    assert_eq!(roles["alice@example.com"], "external");
    assert_eq!(roles["bob@example.com"], "external");
    assert_eq!(roles["m.e+label@gmail.com"], "self");
}

#[test]
fn encoded_headers_decode_into_frontmatter() {
    let dir = tempfile::tempdir().unwrap();
    let paths = corpus(dir.path());
    let ops = SyncOps::new(paths.clone(), ACCOUNT);

    // RFC 2047 display name and subject, quoted-printable body.
    let raw = "Message-ID: <enc@x>\r\n\
From: =?UTF-8?Q?Jos=C3=A9_N=C3=BA=C3=B1ez?= <jose@example.com>\r\n\
To: me@gmail.com\r\n\
Subject: =?UTF-8?Q?Caf=C3=A9_budget?=\r\n\
Date: Tue, 17 Feb 2026 09:00:00 +0000\r\n\
Content-Type: text/plain; charset=UTF-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\r\n\
The caf=C3=A9 spend is up 12%.\r\n"
        .to_string();

    ops.process_batch(&[fetched(51, raw)], true).unwrap();

    let snap = snapshot(&paths.account_dir(ACCOUNT));
    let message = snap
        .iter()
        .find(|(k, _)| k.ends_with(".md"))
        .map(|(_, v)| String::from_utf8_lossy(v).into_owned())
        .unwrap();

    assert!(message.contains("José Núñez"));
    assert!(message.contains("The café spend is up 12%."));

    let threads = maildeck::corpus::jsonl::read_all(&paths.threads_index(ACCOUNT)).unwrap();
    assert_eq!(threads[0]["subject"], "Café budget");
}
