use structured_json_output::prelude::*;
use structured_json_output::validation::validate;

fn joke_schema() -> Schema {
    Schema::builder()
        .title("Joke")
        .field("setup", FieldType::String, "question to set up a joke")
        .field("punchline", FieldType::String, "answer to resolve the joke")
        .build()
        .unwrap()
}

const VALID_JOKE: &str =
    r#"{"setup": "Why don't crabs share?", "punchline": "Because they're shellfish."}"#;

#[tokio::test]
async fn valid_first_response_needs_one_call() {
    let backend = MockGenerator::scripted([VALID_JOKE]);

    let result = generate("Tell me a joke.", &joke_schema(), 5, &backend)
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.attempts(), 1);
    assert_eq!(backend.calls(), 1);
    assert!(validate(&joke_schema(), result.value().unwrap()).is_empty());
}

#[tokio::test]
async fn malformed_output_exhausts_all_attempts() {
    let backend = MockGenerator::scripted(["Here's a joke: why did the chicken"]);

    let result = generate("Tell me a joke.", &joke_schema(), 4, &backend)
        .await
        .unwrap();

    assert!(!result.is_success());
    assert_eq!(result.attempts(), 4);
    assert_eq!(backend.calls(), 4);
    assert!(!result.violations().is_empty());
    assert!(result
        .violations()
        .iter()
        .all(|v| v.kind() == ViolationKind::Parse));
    assert_eq!(
        result.last_output(),
        Some("Here's a joke: why did the chicken")
    );
}

#[tokio::test]
async fn missing_field_is_corrected_on_second_attempt() {
    let backend = MockGenerator::scripted([
        r#"{"setup": "Why don't crabs share?"}"#,
        VALID_JOKE,
    ]);

    let result = generate("Tell me a joke.", &joke_schema(), 3, &backend)
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.attempts(), 2);

    let prompts = backend.prompts().await;
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains("field 'punchline' missing"));
    assert!(prompts[1].contains("field 'punchline' missing"));
    assert!(prompts[1].contains(r#"{"setup": "Why don't crabs share?"}"#));
}

#[tokio::test]
async fn invocations_never_exceed_budget() {
    for max_attempts in 1..=5 {
        let backend = MockGenerator::new(|req| {
            Ok(match req.call_index % 3 {
                0 => "[]".to_string(),
                1 => r#"{"setup": 1}"#.to_string(),
                _ => "{".to_string(),
            })
        });

        let result = generate("Tell me a joke.", &joke_schema(), max_attempts, &backend)
            .await
            .unwrap();

        assert!(backend.calls() <= max_attempts);
        assert_eq!(result.attempts(), backend.calls());
    }
}

#[tokio::test]
async fn every_violation_reaches_the_corrective_prompt() {
    let backend = MockGenerator::scripted([r#"{"rating": 5}"#, VALID_JOKE]);

    generate("Tell me a joke.", &joke_schema(), 2, &backend)
        .await
        .unwrap();

    let prompts = backend.prompts().await;
    assert!(prompts[1].contains("- field 'setup' missing"));
    assert!(prompts[1].contains("- field 'punchline' missing"));
}

#[tokio::test]
async fn extra_fields_are_accepted() {
    let backend = MockGenerator::scripted([
        r#"{"setup": "a", "punchline": "b", "rating": 9, "tags": ["pun"]}"#,
    ]);

    let result = generate("Tell me a joke.", &joke_schema(), 2, &backend)
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.value().unwrap()["rating"], 9);
}

#[tokio::test]
async fn transport_errors_consume_attempts_without_escaping() {
    let backend = MockGenerator::new(|_| Err(StructuredError::Backend("connection refused".into())));

    let result = generate("Tell me a joke.", &joke_schema(), 3, &backend)
        .await
        .unwrap();

    assert_eq!(backend.calls(), 3);
    assert_eq!(result.attempts(), 3);
    assert_eq!(result.violations()[0].kind(), ViolationKind::Transport);
    assert!(result.violations()[0].is_retryable());
    assert_eq!(result.last_output(), None);
}

#[tokio::test]
async fn non_object_responses_are_rejected() {
    let cases = [
        (r#"[{"setup": "a", "punchline": "b"}]"#, "array"),
        (r#"[1, {"setup": "a", "punchline": "b"}, 2]"#, "array"),
        (r#""setup: a, punchline: b""#, "string"),
        ("42", "number"),
    ];
    for (raw, actual) in cases {
        let backend = MockGenerator::scripted([raw]);

        let result = generate("Tell me a joke.", &joke_schema(), 1, &backend)
            .await
            .unwrap();

        assert!(!result.is_success(), "{raw} was accepted");
        assert_eq!(result.violations().len(), 1);
        assert_eq!(result.violations()[0].kind(), ViolationKind::NotAnObject);
        assert_eq!(
            result.violations()[0].to_string(),
            format!("response must be a JSON object, got {actual}")
        );
        assert_eq!(result.last_output(), Some(raw));
    }
}

#[tokio::test]
async fn array_wrapped_answer_is_corrected_on_retry() {
    let backend = MockGenerator::scripted([
        r#"[{"setup": "a", "punchline": "b"}]"#,
        r#"{"setup": "a", "punchline": "b"}"#,
    ]);

    let result = generate("Tell me a joke.", &joke_schema(), 3, &backend)
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.attempts(), 2);
    let prompts = backend.prompts().await;
    assert!(prompts[1].contains("response must be a JSON object, got array"));
}

#[tokio::test]
async fn wrong_types_then_success() {
    let backend = MockGenerator::scripted([r#"{"setup": "a", "punchline": 42}"#, VALID_JOKE]);

    let result = generate("Tell me a joke.", &joke_schema(), 3, &backend)
        .await
        .unwrap();

    assert_eq!(result.attempts(), 2);
    let prompts = backend.prompts().await;
    assert!(prompts[1].contains("field 'punchline' expected string, got number"));
}

#[tokio::test]
async fn client_uses_configured_budget() {
    let client = StructuredClientBuilder::new()
        .with_mock(|_| Ok("nope".to_string()))
        .with_max_attempts(2)
        .build()
        .unwrap();

    let result = client.generate("Tell me a joke.", &joke_schema()).await.unwrap();
    assert_eq!(result.attempts(), 2);

    let result = client
        .generate_with_attempts("Tell me a joke.", &joke_schema(), 4)
        .await
        .unwrap();
    assert_eq!(result.attempts(), 4);
}

#[tokio::test]
async fn empty_instruction_is_the_only_error() {
    let backend = MockGenerator::scripted([VALID_JOKE]);
    let err = generate("", &joke_schema(), 3, &backend).await.unwrap_err();
    assert!(matches!(err, StructuredError::InvalidRequest(_)));
    assert_eq!(backend.calls(), 0);
}
