use std::sync::Arc;
use std::time::Duration;

use lsptrace::{DirectionPipeline, Origin, RequestMap, TraceWriter};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const PIPE_CAP: usize = 256 * 1024;

fn frame(body: &str) -> Vec<u8> {
    format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
}

fn collect(mut reader: DuplexStream) -> JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        out
    })
}

fn parse_lines(bytes: &[u8]) -> Vec<serde_json::Value> {
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    text.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Runs one direction to EOF: feeds `chunks` as the source, returns the
/// bytes that reached the forward endpoint and the parsed trace lines.
async fn run_direction(
    chunks: Vec<Vec<u8>>,
    from: Origin,
    requests: Arc<RequestMap>,
) -> (Vec<u8>, Vec<serde_json::Value>) {
    let (mut source_in, source_out) = duplex(PIPE_CAP);
    let (forward_in, forward_out) = duplex(PIPE_CAP);
    let (sink_in, sink_out) = duplex(PIPE_CAP);

    let sink = TraceWriter::new(sink_in);
    let done = DirectionPipeline::new(
        Box::new(source_out),
        Box::new(forward_in),
        sink.clone(),
        requests,
        from,
    )
    .start();
    let forwarded = collect(forward_out);
    let sink_bytes = collect(sink_out);

    for chunk in &chunks {
        source_in.write_all(chunk).await.unwrap();
    }
    drop(source_in);

    timeout(Duration::from_secs(5), done).await.unwrap().unwrap();
    drop(sink);
    let forwarded = timeout(Duration::from_secs(5), forwarded)
        .await
        .unwrap()
        .unwrap();
    let sink_bytes = timeout(Duration::from_secs(5), sink_bytes)
        .await
        .unwrap()
        .unwrap();
    (forwarded, parse_lines(&sink_bytes))
}

fn code_lens_request() -> Vec<u8> {
    frame(r#"{"jsonrpc":"2.0","id":62,"method":"textDocument/codeLens","params":{"textDocument":{"uri":"file:///p.cs"}}}"#)
}

#[tokio::test]
async fn single_request_produces_one_trace() {
    let requests = Arc::new(RequestMap::new());
    let input = code_lens_request();
    let (forwarded, traces) = run_direction(vec![input.clone()], Origin::Client, requests).await;

    assert_eq!(forwarded, input);
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0]["msgKind"], "request");
    assert_eq!(traces[0]["from"], "client");
    assert_eq!(traces[0]["method"], "textDocument/codeLens");
    assert_eq!(traces[0]["id"], 62);
}

#[tokio::test]
async fn chunked_delivery_produces_the_same_single_trace() {
    let requests = Arc::new(RequestMap::new());
    let input = code_lens_request();
    // Split inside the header, after `"id":62`, and inside the params.
    let chunks = vec![
        input[..10].to_vec(),
        input[10..48].to_vec(),
        input[48..90].to_vec(),
        input[90..].to_vec(),
    ];
    let (forwarded, traces) = run_direction(chunks, Origin::Client, requests).await;

    assert_eq!(forwarded, input);
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0]["msgKind"], "request");
    assert_eq!(traces[0]["id"], 62);
}

#[tokio::test]
async fn response_trace_recovers_method_across_directions() {
    let requests = Arc::new(RequestMap::new());

    let (_, client_traces) = run_direction(
        vec![code_lens_request()],
        Origin::Client,
        Arc::clone(&requests),
    )
    .await;
    assert_eq!(client_traces[0]["msgKind"], "request");

    let (_, server_traces) = run_direction(
        vec![frame(r#"{"jsonrpc":"2.0","id":62,"result":[]}"#)],
        Origin::Server,
        requests,
    )
    .await;
    assert_eq!(server_traces.len(), 1);
    assert_eq!(server_traces[0]["msgKind"], "response");
    assert_eq!(server_traces[0]["from"], "server");
    assert_eq!(server_traces[0]["id"], 62);
    assert_eq!(server_traces[0]["method"], "textDocument/codeLens");
}

#[tokio::test]
async fn unknown_id_response_traces_with_empty_method() {
    let requests = Arc::new(RequestMap::new());
    let (_, traces) = run_direction(
        vec![frame(r#"{"jsonrpc":"2.0","id":999,"result":{}}"#)],
        Origin::Server,
        requests,
    )
    .await;

    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0]["msgKind"], "response");
    assert_eq!(traces[0]["id"], 999);
    assert_eq!(traces[0]["method"], "");
}

#[tokio::test]
async fn garbage_before_content_length_still_traces() {
    let requests = Arc::new(RequestMap::new());
    let input = b"xyzContent-Length: 2\r\n\r\n{}".to_vec();
    let (forwarded, traces) = run_direction(vec![input.clone()], Origin::Client, requests).await;

    assert_eq!(forwarded, input);
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0]["msgKind"], "unknown");
}

#[tokio::test]
async fn interleaved_directions_classify_and_correlate() {
    let requests = Arc::new(RequestMap::new());

    let (_, client_traces) = run_direction(
        vec![frame(r#"{"jsonrpc":"2.0","method":"$/progress","params":{}}"#)],
        Origin::Client,
        Arc::clone(&requests),
    )
    .await;
    assert_eq!(client_traces[0]["msgKind"], "notification");

    let (_, server_traces) = run_direction(
        vec![frame(
            r#"{"jsonrpc":"2.0","id":5,"method":"workspace/configuration"}"#,
        )],
        Origin::Server,
        Arc::clone(&requests),
    )
    .await;
    assert_eq!(server_traces[0]["msgKind"], "request");

    let (_, answer_traces) = run_direction(
        vec![frame(r#"{"jsonrpc":"2.0","id":5,"result":[]}"#)],
        Origin::Client,
        requests,
    )
    .await;
    assert_eq!(answer_traces[0]["msgKind"], "response");
    assert_eq!(answer_traces[0]["method"], "workspace/configuration");
}

#[tokio::test]
async fn forward_bytes_are_faithful_even_when_decoding_fails() {
    let requests = Arc::new(RequestMap::new());
    let mut input = frame("this body is not json");
    input.extend_from_slice(&frame(r#"{"id":1,"method":"ok"}"#));
    input.extend_from_slice(b"trailing stray bytes without a header");

    let (forwarded, traces) = run_direction(vec![input.clone()], Origin::Client, requests).await;

    assert_eq!(forwarded, input);
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0]["method"], "ok");
}

#[tokio::test]
async fn traces_preserve_stream_order_within_a_direction() {
    let requests = Arc::new(RequestMap::new());
    let mut input = Vec::new();
    for id in 0..20 {
        input.extend_from_slice(&frame(&format!(r#"{{"id":{id},"method":"m/{id}"}}"#)));
    }
    let (_, traces) = run_direction(vec![input], Origin::Client, requests).await;

    assert_eq!(traces.len(), 20);
    for (at, trace) in traces.iter().enumerate() {
        assert_eq!(trace["id"], at as i64);
    }
}

#[tokio::test]
async fn concurrent_directions_append_whole_lines_to_one_sink() {
    let requests = Arc::new(RequestMap::new());
    let (sink_in, sink_out) = duplex(PIPE_CAP);
    let sink = TraceWriter::new(sink_in);
    let sink_bytes = collect(sink_out);

    let mut dones = Vec::new();
    let mut forwards = Vec::new();
    let mut writers = Vec::new();
    for from in [Origin::Client, Origin::Server] {
        let (mut source_in, source_out) = duplex(PIPE_CAP);
        let (forward_in, forward_out) = duplex(PIPE_CAP);
        let done = DirectionPipeline::new(
            Box::new(source_out),
            Box::new(forward_in),
            sink.clone(),
            Arc::clone(&requests),
            from,
        )
        .start();
        dones.push(done);
        forwards.push(collect(forward_out));
        writers.push(tokio::spawn(async move {
            for seq in 0..50 {
                let body = format!(r#"{{"method":"{}/{seq}","params":{{}}}}"#, from.as_str());
                source_in.write_all(&frame(&body)).await.unwrap();
            }
        }));
    }

    for writer in writers {
        timeout(Duration::from_secs(5), writer)
            .await
            .unwrap()
            .unwrap();
    }
    for done in dones {
        timeout(Duration::from_secs(5), done).await.unwrap().unwrap();
    }
    for forward in forwards {
        timeout(Duration::from_secs(5), forward)
            .await
            .unwrap()
            .unwrap();
    }
    drop(sink);

    let traces = parse_lines(
        &timeout(Duration::from_secs(5), sink_bytes)
            .await
            .unwrap()
            .unwrap(),
    );
    assert_eq!(traces.len(), 100);
    let from_client = traces.iter().filter(|t| t["from"] == "client").count();
    assert_eq!(from_client, 50);
    for trace in &traces {
        assert_eq!(trace["msgKind"], "notification");
    }
}
