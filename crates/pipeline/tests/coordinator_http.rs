use std::io::Read;

use chapterforge_pipeline::coordinator::{PollStatus, RemoteTranscriptionCoordinator};
use tiny_http::{Response, Server};

fn spawn_stub(handler: impl Fn(&tiny_http::Request) -> (u16, String) + Send + 'static) -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_string();
    std::thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let mut body = String::new();
            let _ = request.as_reader().read_to_string(&mut body);
            let (status, response_body) = handler(&request);
            let response = Response::from_string(response_body).with_status_code(status);
            let _ = request.respond(response);
        }
    });
    format!("http://{addr}")
}

#[test]
fn poll_reports_completed_when_worker_says_so() {
    let base_url = spawn_stub(|_req| (200, r#"{"status":"completed"}"#.to_string()));
    let coordinator = RemoteTranscriptionCoordinator::new(base_url, "large".to_string());
    let status = coordinator.poll("01ARZ3NDEKTSV4RRFFQ69G5FAV").unwrap();
    assert_eq!(status, PollStatus::Completed);
}

#[test]
fn poll_reports_running_for_unrecognized_status_values() {
    let base_url = spawn_stub(|_req| (200, r#"{"status":"queued"}"#.to_string()));
    let coordinator = RemoteTranscriptionCoordinator::new(base_url, "large".to_string());
    let status = coordinator.poll("01ARZ3NDEKTSV4RRFFQ69G5FAV").unwrap();
    assert_eq!(status, PollStatus::Running);
}

#[test]
fn retrieve_returns_the_response_body_verbatim() {
    let base_url = spawn_stub(|_req| (200, "this is the transcript".to_string()));
    let coordinator = RemoteTranscriptionCoordinator::new(base_url, "large".to_string());
    let text = coordinator.retrieve("01ARZ3NDEKTSV4RRFFQ69G5FAV").unwrap();
    assert_eq!(text, "this is the transcript");
}

#[test]
fn poll_non_2xx_is_transient_remote_error() {
    let base_url = spawn_stub(|_req| (500, "internal error".to_string()));
    let coordinator = RemoteTranscriptionCoordinator::new(base_url, "large".to_string());
    let result = coordinator.poll("01ARZ3NDEKTSV4RRFFQ69G5FAV");
    assert!(result.is_err());
}
