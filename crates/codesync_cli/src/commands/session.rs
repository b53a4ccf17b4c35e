//! One-shot session commands: get, push and join.

use codesync_client::{ClientConfig, HttpTransport, ReqwestClient, SyncTransport};
use codesync_protocol::{JoinRequest, UpdateRequest, DEFAULT_SESSION_ID};
use std::io::Read;
use std::path::Path;

type Connection<'a> = (HttpTransport<ReqwestClient>, &'a str);

fn connect(config: &ClientConfig) -> Result<Connection<'_>, Box<dyn std::error::Error>> {
    let transport = HttpTransport::connect(config)?;
    let session_id = config.session_id.as_deref().unwrap_or(DEFAULT_SESSION_ID);
    Ok((transport, session_id))
}

/// Prints the current code of a session.
pub async fn get(config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (transport, session_id) = connect(config)?;
    let session = transport.get(session_id).await?;

    eprintln!(
        "session {} (last modified {}, {} participants)",
        session_id, session.last_modified, session.participants
    );
    print!("{}", session.code);
    Ok(())
}

/// Replaces the code of a session with the contents of `file`, or stdin.
pub async fn push(
    config: &ClientConfig,
    file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let code = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut code = String::new();
            std::io::stdin().read_to_string(&mut code)?;
            code
        }
    };

    let (transport, session_id) = connect(config)?;
    let request = UpdateRequest::new(code, config.participant_id.clone());
    let session = transport.update(session_id, &request).await?;

    println!(
        "Updated session {} at {} ({} bytes)",
        session_id,
        session.last_modified,
        session.code.len()
    );
    Ok(())
}

/// Joins a session and prints the participant count.
pub async fn join(config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (transport, session_id) = connect(config)?;
    let request = JoinRequest::new(config.participant_id.clone());
    let session = transport.join(session_id, &request).await?;

    println!(
        "Joined session {} as {} ({} participants)",
        session_id, config.participant_id, session.participants
    );
    Ok(())
}
