use std::time::Duration;

use greenword_lib::config::EditorConfig;
use greenword_lib::storage::{FileStore, Persistence};
use greenword_lib::voice::VoiceInput;
use greenword_lib::{Document, Editor, Error, Origin, SessionState};

fn config() -> EditorConfig {
    EditorConfig {
        ice_servers: Vec::new(),
        gather_timeout: Duration::from_secs(2),
        grace_period: Duration::from_millis(200),
        ..EditorConfig::default()
    }
}

fn editor() -> Editor {
    Editor::new(config(), Persistence::in_memory(), VoiceInput::unsupported())
}

#[tokio::test]
async fn pasted_texts_drive_both_editors_to_connected() {
    let host = editor();
    let guest = editor();

    let offer = host.start_offer().await.unwrap();
    let answer = guest
        .apply_signal(&offer.text)
        .await
        .unwrap()
        .expect("an offer produces an answer");
    assert_eq!(guest.connected_sessions(), 1);

    assert!(host.apply_signal(&answer.text).await.unwrap().is_none());
    assert_eq!(host.connected_sessions(), 1);

    host.disconnect().await;
    guest.disconnect().await;
    assert_eq!(host.connected_sessions(), 0);
}

#[tokio::test]
async fn offer_survives_the_share_url() {
    let host = editor();
    let guest = editor();

    let offer = host.start_offer().await.unwrap();
    let url = host.share_url(&offer.text).unwrap();
    assert!(url.contains("#offer="));

    let answer = guest.apply_signal(&url).await.unwrap().unwrap();
    host.apply_answer(&answer.text).await.unwrap();
    assert_eq!(host.connected_sessions(), 1);

    host.disconnect().await;
    guest.disconnect().await;
}

#[tokio::test]
async fn garbage_in_the_signal_box_is_malformed() {
    let guest = editor();
    for input in ["", "hello", "{\"type\":\"offer\"}", "{\"type\":\"pranswer\",\"sdp\":\"x\"}"] {
        let err = guest.apply_signal(input).await.unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)), "{input:?}: {err}");
    }
}

#[tokio::test]
async fn unparsable_offer_does_not_leave_sessions_behind() {
    let guest = editor();
    for _ in 0..3 {
        let err = guest
            .apply_signal(r#"{"type":"offer","sdp":"not sdp at all"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)), "{err}");
    }

    let states: Vec<_> = guest.peers().session_infos().into_iter().map(|s| s.state).collect();
    assert_eq!(states, vec![SessionState::Closed; 3]);
    assert_eq!(guest.peers().prune_closed(), 3);
    assert_eq!(guest.connected_sessions(), 0);
}

#[tokio::test]
async fn share_qr_is_svg() {
    let host = editor();
    let offer = host.start_offer().await.unwrap();
    let svg = host.share_qr(&offer.text).unwrap();
    assert!(svg.contains("<svg"));
    host.disconnect().await;
}

#[tokio::test]
async fn document_persists_across_editor_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");

    let first = Editor::new(
        config(),
        Persistence::new(Box::new(FileStore::new(&path))),
        VoiceInput::unsupported(),
    );
    first.local_input("<h1>議事録</h1><p>本文</p>".into()).await;
    first.save_local().unwrap();

    let second = Editor::new(
        config(),
        Persistence::new(Box::new(FileStore::new(&path))),
        VoiceInput::unsupported(),
    );
    let mut rx = second.sync().subscribe();
    let loaded = second.load_local().unwrap();

    assert_eq!(loaded, Some(Document::new("<h1>議事録</h1><p>本文</p>")));
    assert_eq!(rx.borrow_and_update().origin, Origin::Storage);
}

#[tokio::test]
async fn export_writes_named_files() {
    let dir = tempfile::tempdir().unwrap();
    let editor = editor();
    editor.local_input("<p>一行目</p><p>二行目</p>".into()).await;

    for format in [
        greenword_lib::ExportFormat::Html,
        greenword_lib::ExportFormat::Pdf,
        greenword_lib::ExportFormat::Docx,
    ] {
        let path = editor.save_export(dir.path(), format).unwrap();
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some(format.file_name())
        );
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}

/// Host candidates only exist on machines with a non-loopback interface;
/// without one the peers cannot reach each other and the test is skipped.
#[tokio::test]
async fn edits_flow_over_the_data_channel() {
    let host = editor();
    let guest = editor();

    let offer = host.start_offer().await.unwrap();
    if !offer.text.contains("typ host") {
        eprintln!("no host candidate gathered, skipping");
        host.disconnect().await;
        return;
    }
    let answer = guest.start_answer(&offer.text).await.unwrap();
    if !answer.text.contains("typ host") {
        eprintln!("no host candidate gathered on the answering side, skipping");
        host.disconnect().await;
        guest.disconnect().await;
        return;
    }
    host.apply_answer(&answer.text).await.unwrap();

    let mut rx = guest.sync().subscribe();
    let mut delivered = 0;
    for _ in 0..100 {
        delivered = host.local_input("<p>共有</p>".into()).await;
        if delivered > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(delivered, 1);

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            rx.changed().await.unwrap();
            if rx.borrow_and_update().document.markup() == "<p>共有</p>" {
                break;
            }
        }
    })
    .await
    .unwrap();

    host.disconnect().await;
    guest.disconnect().await;
}
