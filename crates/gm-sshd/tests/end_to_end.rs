//! Full round trips through a real SSH client
#![cfg(unix)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh::ChannelMsg;
use russh_keys::key::{KeyPair, PublicKey};

use gm_core::{ShellConfig, TracingErrorSink};
use gm_sshd::auth::MasterPassword;
use gm_sshd::{RusshHandshaker, ServerHandle, SshServer};

const PASSWORD: &str = "correct-horse";
const WAIT: Duration = Duration::from_secs(15);

struct TrustingClient;

#[async_trait]
impl client::Handler for TrustingClient {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

async fn start_server() -> ServerHandle {
    let key = KeyPair::generate_ed25519().unwrap();
    let shell = ShellConfig::new("/bin/sh", Arc::new(TracingErrorSink));
    let handshaker = RusshHandshaker::new(
        key,
        Arc::new(MasterPassword::new(PASSWORD)),
        Arc::new(TracingErrorSink),
    );

    SshServer::new(Arc::new(handshaker), shell)
        .listen("127.0.0.1:0")
        .await
        .unwrap()
}

async fn connect(addr: SocketAddr) -> client::Handle<TrustingClient> {
    let config = Arc::new(client::Config::default());
    client::connect(config, addr, TrustingClient).await.unwrap()
}

#[tokio::test]
async fn test_shell_session() {
    let server = start_server().await;
    let mut session = connect(server.local_addr()).await;
    assert!(session.authenticate_password("anyone", PASSWORD).await.unwrap());

    let mut channel = session.channel_open_session().await.unwrap();
    channel
        .request_pty(true, "xterm", 80, 24, 0, 0, &[])
        .await
        .unwrap();
    channel.request_shell(true).await.unwrap();
    channel
        .data(&b"echo ready-$((6 * 7))\nexit\n"[..])
        .await
        .unwrap();

    let mut output = Vec::new();
    let mut successes = 0;
    let mut exit_status = None;

    tokio::time::timeout(WAIT, async {
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Success => successes += 1,
                ChannelMsg::Data { data } => output.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                ChannelMsg::Close => break,
                _ => {}
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(successes, 2);
    assert_eq!(exit_status, Some(0));
    assert!(String::from_utf8_lossy(&output).contains("ready-42"));

    server.close().await;
}

#[tokio::test]
async fn test_pipelined_requests_each_get_one_reply() {
    let server = start_server().await;
    let mut session = connect(server.local_addr()).await;
    assert!(session.authenticate_password("anyone", PASSWORD).await.unwrap());

    // Sent back to back without waiting, the way OpenSSH does it.
    let mut channel = session.channel_open_session().await.unwrap();
    channel
        .request_pty(true, "xterm", 80, 24, 0, 0, &[])
        .await
        .unwrap();
    channel.set_env(false, "LANG", "C").await.unwrap();
    channel.set_env(true, "LC_ALL", "C").await.unwrap();
    channel.window_change(100, 40, 0, 0).await.unwrap();
    channel.request_shell(true).await.unwrap();
    channel.data(&b"exit\n"[..]).await.unwrap();

    let mut replies = Vec::new();
    tokio::time::timeout(WAIT, async {
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Success => replies.push(true),
                ChannelMsg::Failure => replies.push(false),
                ChannelMsg::Close => break,
                _ => {}
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(replies, vec![true, true, true]);
    server.close().await;
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let server = start_server().await;
    let mut session = connect(server.local_addr()).await;

    assert!(!session.authenticate_password("anyone", "guess").await.unwrap());

    server.close().await;
}

#[tokio::test]
async fn test_two_sessions_on_one_connection() {
    let server = start_server().await;
    let mut session = connect(server.local_addr()).await;
    assert!(session.authenticate_password("root", PASSWORD).await.unwrap());

    let mut first = session.channel_open_session().await.unwrap();
    let mut second = session.channel_open_session().await.unwrap();
    for channel in [&mut first, &mut second] {
        channel
            .request_pty(false, "xterm", 80, 24, 0, 0, &[])
            .await
            .unwrap();
    }

    // Ending the first shell leaves the second one usable.
    first.data(&b"exit\n"[..]).await.unwrap();
    tokio::time::timeout(WAIT, async {
        while let Some(msg) = first.wait().await {
            if matches!(msg, ChannelMsg::Close) {
                break;
            }
        }
    })
    .await
    .unwrap();

    second.data(&b"echo second-$((1 + 1))\nexit\n"[..]).await.unwrap();
    let mut output = Vec::new();
    tokio::time::timeout(WAIT, async {
        while let Some(msg) = second.wait().await {
            match msg {
                ChannelMsg::Data { data } => output.extend_from_slice(&data),
                ChannelMsg::Close => break,
                _ => {}
            }
        }
    })
    .await
    .unwrap();

    assert!(String::from_utf8_lossy(&output).contains("second-2"));
    server.close().await;
}
