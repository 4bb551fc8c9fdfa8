use assistant_core::mocks::{MockMarket, ScriptedCompletion};
use assistant_core::session::SessionId;
use assistant_core::Assistant;

#[tokio::main]
async fn main() {
    // Wire mocks: a scripted classifier/resolver and a healthy market.
    let completion = ScriptedCompletion::replies(vec![
        r#"{"category": "report"}"#,
        r#"{"symbol": "AAPL"}"#,
    ]);
    let market = MockMarket::healthy("AAPL");
    let assistant = Assistant::new(completion, market);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let text = args.join(" ");
    let text = if text.is_empty() {
        "Tell me about Apple".to_string()
    } else {
        text
    };

    let session = SessionId::new("demo");
    match assistant.handle(&session, &text).await {
        Ok(payload) => println!("{}", payload.text),
        Err(e) => eprintln!("error: {}", e),
    }
}
