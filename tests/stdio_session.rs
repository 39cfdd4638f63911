mod common;

use common::{FixedOcr, MockBackend, ScriptedModel, TEXT_REPLY, dispatcher, text_pdf};
use emo_mcp::document::ExternalError;
use emo_mcp::server::serve_lines;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Session {
    fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let mut child = Command::new(env!("CARGO_BIN_EXE_emo-mcp"))
            .args(["serve", "--stdio"])
            .env("SUPABASE_URL", "http://127.0.0.1:9")
            .env("SUPABASE_SERVICE_ROLE_KEY", "test-key")
            .env("GEMINI_API_KEY", "test-key")
            .env("RUST_LOG", "off")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdin = child.stdin.take().expect("stdin available");
        let stdout = BufReader::new(child.stdout.take().expect("stdout available"));
        Ok(Self {
            child,
            stdin,
            stdout,
        })
    }

    fn send(&mut self, line: &str) -> Result<(), Box<dyn std::error::Error>> {
        writeln!(self.stdin, "{line}")?;
        self.stdin.flush()?;
        Ok(())
    }

    fn request(
        &mut self,
        request: serde_json::Value,
    ) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
        self.send(&serde_json::to_string(&request)?)?;
        let mut line = String::new();
        self.stdout.read_line(&mut line)?;
        Ok(serde_json::from_str(line.trim())?)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

#[test]
fn initialize_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::start()?;
    let response = session.request(serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {}
    }))?;

    assert_eq!(response.get("jsonrpc").and_then(|v| v.as_str()), Some("2.0"));
    assert_eq!(response.get("id").and_then(|v| v.as_i64()), Some(1));

    let result = response.get("result").expect("result present");
    assert_eq!(
        result.get("protocolVersion").and_then(|v| v.as_str()),
        Some("2025-11-25")
    );
    assert!(result.get("capabilities").and_then(|v| v.get("tools")).is_some());

    let server_info = result.get("serverInfo").expect("serverInfo present");
    assert_eq!(server_info.get("name").and_then(|v| v.as_str()), Some("emo-mcp"));
    assert_eq!(
        server_info.get("version").and_then(|v| v.as_str()),
        Some(env!("CARGO_PKG_VERSION"))
    );
    Ok(())
}

#[test]
fn notifications_and_blank_lines_get_no_reply() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::start()?;
    session.send("")?;
    session.send(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)?;

    // The next line read must answer the ping, not the notification.
    let response = session.request(serde_json::json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "ping"
    }))?;
    assert_eq!(response.get("id").and_then(|v| v.as_i64()), Some(2));
    assert!(response.get("result").is_some());
    Ok(())
}

#[test]
fn tools_list_names_every_tool() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::start()?;
    let response = session.request(serde_json::json!({
        "jsonrpc": "2.0",
        "id": 3,
        "method": "tools/list"
    }))?;

    let tools = response
        .get("result")
        .and_then(|v| v.get("tools"))
        .and_then(|v| v.as_array())
        .expect("tools array");
    let names: Vec<&str> = tools
        .iter()
        .filter_map(|tool| tool.get("name").and_then(|v| v.as_str()))
        .collect();
    for expected in [
        "casos_listar",
        "trabajadores_obtener",
        "examenes_analizar",
        "examenes_registrar",
        "empresas_crear",
        "storage_descargar",
    ] {
        assert!(names.contains(&expected), "missing {expected}");
    }
    Ok(())
}

#[test]
fn protocol_errors() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::start()?;

    let unknown_method = session.request(serde_json::json!({
        "jsonrpc": "2.0",
        "id": 4,
        "method": "prompts/list"
    }))?;
    assert_eq!(
        unknown_method.pointer("/error/code").and_then(|v| v.as_i64()),
        Some(-32601)
    );

    let missing_name = session.request(serde_json::json!({
        "jsonrpc": "2.0",
        "id": 5,
        "method": "tools/call",
        "params": {"arguments": {}}
    }))?;
    assert_eq!(
        missing_name.pointer("/error/code").and_then(|v| v.as_i64()),
        Some(-32602)
    );

    session.send("{broken")?;
    let mut line = String::new();
    session.stdout.read_line(&mut line)?;
    let parse_error: serde_json::Value = serde_json::from_str(line.trim())?;
    assert_eq!(
        parse_error.pointer("/error/code").and_then(|v| v.as_i64()),
        Some(-32700)
    );
    Ok(())
}

#[test]
fn validation_error_is_embedded_in_result() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::start()?;
    let response = session.request(serde_json::json!({
        "jsonrpc": "2.0",
        "id": 6,
        "method": "tools/call",
        "params": {"name": "storage_listar", "arguments": {}}
    }))?;

    assert!(response.get("error").is_none());
    let result = response.get("result").expect("result present");
    assert_eq!(result.get("isError").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        result.get("error_code").and_then(|v| v.as_str()),
        Some("VALIDATION_ERROR")
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_call_does_not_hold_back_later_requests() -> Result<(), Box<dyn std::error::Error>> {
    let model = ScriptedModel::new(vec![
        Err(ExternalError::http(503, "model overloaded")),
        Err(ExternalError::http(503, "model overloaded")),
        Ok(TEXT_REPLY.to_string()),
    ]);
    let dispatcher = dispatcher(
        MockBackend::with_rows("casos", Vec::new()),
        model.clone(),
        FixedOcr::recognized("texto"),
    );

    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server);
    let serving = tokio::spawn(serve_lines(
        dispatcher,
        tokio::io::BufReader::new(server_read),
        server_write,
    ));
    let (client_read, mut client_write) = tokio::io::split(client);

    let analyze = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": "examenes_analizar", "arguments": {"pdf_base64": text_pdf()}}
    });
    let ping = serde_json::json!({"jsonrpc": "2.0", "id": 2, "method": "ping"});
    client_write
        .write_all(format!("{analyze}\n{ping}\n").as_bytes())
        .await?;

    let mut replies = tokio::io::BufReader::new(client_read).lines();
    let first: serde_json::Value =
        serde_json::from_str(&replies.next_line().await?.expect("first reply"))?;
    assert_eq!(first["id"], serde_json::json!(2));
    assert!(model.call_count() < 3, "ping waited for the analysis");

    let second: serde_json::Value =
        serde_json::from_str(&replies.next_line().await?.expect("second reply"))?;
    assert_eq!(second["id"], serde_json::json!(1));
    assert!(second["result"].get("isError").is_none(), "{second}");
    assert_eq!(model.call_count(), 3);

    client_write.shutdown().await?;
    serving.await??;
    Ok(())
}
