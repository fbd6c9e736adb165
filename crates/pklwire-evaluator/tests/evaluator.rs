mod support;

use std::collections::BTreeMap;

use pklwire_evaluator::{
    EvaluatorError, EvaluatorOptions, ModuleReader, ModuleSource, OutputFormat, PathElement,
    Reader, ReaderResult, ResourceReader,
};
use pklwire_frame::{rmpv, IncomingMessage, OutgoingMessage, ReadRequest};
use pklwire_value::{Dynamic, Properties, TypedObject, Value, ValueMap};
use url::Url;

struct Greetings;

impl Reader for Greetings {
    fn scheme(&self) -> &str {
        "greet"
    }

    fn is_globbable(&self) -> bool {
        true
    }

    fn has_hierarchical_uris(&self) -> bool {
        true
    }

    fn list_elements(&self, _url: &Url) -> ReaderResult<Vec<PathElement>> {
        Ok(vec![
            PathElement::new("hello.pkl", false),
            PathElement::new("nested", true),
        ])
    }
}

impl ModuleReader for Greetings {
    fn is_local(&self) -> bool {
        true
    }

    fn read(&self, url: &Url) -> ReaderResult<String> {
        Ok(format!("greeting = \"hello {}\"", url.path()))
    }
}

struct Broken;

impl Reader for Broken {
    fn scheme(&self) -> &str {
        "broken"
    }

    fn is_globbable(&self) -> bool {
        false
    }

    fn has_hierarchical_uris(&self) -> bool {
        false
    }

    fn list_elements(&self, _url: &Url) -> ReaderResult<Vec<PathElement>> {
        Err("cannot list".into())
    }
}

impl ResourceReader for Broken {
    fn read(&self, _url: &Url) -> ReaderResult<Vec<u8>> {
        Err("disk on fire".into())
    }
}

fn read_request(evaluator_id: i64, request_id: i64, uri: &str) -> ReadRequest {
    ReadRequest {
        request_id,
        evaluator_id,
        uri: uri.to_string(),
    }
}

fn dynamic(properties: &[(&str, Value)]) -> Value {
    Value::Dynamic(Dynamic {
        properties: properties
            .iter()
            .map(|(name, value)| (*name, value.clone()))
            .collect(),
        ..Dynamic::default()
    })
}

#[tokio::test]
async fn test_create_and_evaluate_module() {
    let (manager, mut server) = support::connect();
    let (evaluator, create) = tokio::join!(
        manager.new_evaluator(EvaluatorOptions::default().with_output_format(OutputFormat::Yaml)),
        server.accept_evaluator(7),
    );
    let evaluator = evaluator.expect("evaluator should be created");
    assert_eq!(evaluator.id(), 7);
    assert_eq!(create.output_format.as_deref(), Some("yaml"));
    assert_eq!(create.client_module_readers, Some(vec![]));
    assert_eq!(create.project, None);

    let source = ModuleSource::text("name = \"pkl\"");
    let (result, ()) = tokio::join!(evaluator.evaluate_module(&source), async {
        let evaluate = server.expect_evaluate().await;
        assert_eq!(evaluate.evaluator_id, 7);
        assert_eq!(evaluate.module_uri, "repl:text");
        assert_eq!(evaluate.module_text.as_deref(), Some("name = \"pkl\""));
        assert_eq!(evaluate.expr, None);
        server
            .reply_value(&evaluate, &dynamic(&[("name", Value::from("pkl"))]))
            .await;
    });

    let value = result.expect("evaluation should succeed");
    assert_eq!(value.property("name").and_then(Value::as_str), Some("pkl"));
}

#[tokio::test]
async fn test_expression_and_output_text() {
    let (manager, mut server) = support::connect();
    let (evaluator, _) = tokio::join!(
        manager.new_evaluator(EvaluatorOptions::default()),
        server.accept_evaluator(1),
    );
    let evaluator = evaluator.expect("evaluator should be created");
    let source = ModuleSource::uri("file:///work/config.pkl").expect("uri should parse");

    let (result, ()) = tokio::join!(evaluator.evaluate_expression(&source, "port + 1"), async {
        let evaluate = server.expect_evaluate().await;
        assert_eq!(evaluate.module_uri, "file:///work/config.pkl");
        assert_eq!(evaluate.module_text, None);
        assert_eq!(evaluate.expr.as_deref(), Some("port + 1"));
        server.reply_value(&evaluate, &Value::Int(8081)).await;
    });
    assert_eq!(result.expect("evaluation should succeed"), Value::Int(8081));

    let (text, ()) = tokio::join!(evaluator.evaluate_output_text(&source), async {
        let evaluate = server.expect_evaluate().await;
        assert_eq!(evaluate.expr.as_deref(), Some("output.text"));
        server
            .reply_value(&evaluate, &Value::from("port = 8080\n"))
            .await;
    });
    assert_eq!(text.expect("output text should succeed"), "port = 8080\n");

    let (text, ()) = tokio::join!(evaluator.evaluate_output_text(&source), async {
        let evaluate = server.expect_evaluate().await;
        server.reply_value(&evaluate, &Value::Int(3)).await;
    });
    assert!(matches!(
        text,
        Err(EvaluatorError::UnexpectedResult { expected: "string", .. })
    ));
}

#[tokio::test]
async fn test_responses_out_of_order() {
    let (manager, mut server) = support::connect();
    let (evaluator, _) = tokio::join!(
        manager.new_evaluator(EvaluatorOptions::default()),
        server.accept_evaluator(3),
    );
    let evaluator = evaluator.expect("evaluator should be created");
    let source = ModuleSource::text("a = 1\nb = 2");

    let (a, b, ()) = tokio::join!(
        evaluator.evaluate_expression(&source, "a"),
        evaluator.evaluate_expression(&source, "b"),
        async {
            let first = server.expect_evaluate().await;
            let second = server.expect_evaluate().await;
            assert_ne!(first.request_id, second.request_id);
            for evaluate in [&second, &first] {
                let answer = match evaluate.expr.as_deref() {
                    Some("a") => 1,
                    Some("b") => 2,
                    other => panic!("unexpected expression {other:?}"),
                };
                server.reply_value(evaluate, &Value::Int(answer)).await;
            }
        }
    );
    assert_eq!(a.expect("a should evaluate"), Value::Int(1));
    assert_eq!(b.expect("b should evaluate"), Value::Int(2));
}

#[tokio::test]
async fn test_evaluation_error_is_verbatim() {
    let (manager, mut server) = support::connect();
    let (evaluator, _) = tokio::join!(
        manager.new_evaluator(EvaluatorOptions::default()),
        server.accept_evaluator(1),
    );
    let evaluator = evaluator.expect("evaluator should be created");
    let message = "Pkl Error\nCannot find property `nope`.";

    let source = ModuleSource::text("x = 1");
    let (result, ()) = tokio::join!(
        evaluator.evaluate_expression(&source, "nope"),
        async {
            let evaluate = server.expect_evaluate().await;
            server.reply_error(&evaluate, message).await;
        }
    );
    match result {
        Err(EvaluatorError::Evaluation(text)) => assert_eq!(text, message),
        other => panic!("expected evaluation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_close_fails_pending_and_later_calls() {
    let (manager, mut server) = support::connect();
    let (evaluator, _) = tokio::join!(
        manager.new_evaluator(EvaluatorOptions::default()),
        server.accept_evaluator(9),
    );
    let evaluator = evaluator.expect("evaluator should be created");
    let source = ModuleSource::text("x = 1");

    let (result, ()) = tokio::join!(evaluator.evaluate_module(&source), async {
        server.expect_evaluate().await;
        evaluator.close().await;
    });
    assert!(matches!(result, Err(EvaluatorError::Closed)));
    assert!(evaluator.is_closed());
    assert_eq!(
        server.expect_message().await,
        OutgoingMessage::CloseEvaluator { evaluator_id: 9 }
    );

    assert!(matches!(
        evaluator.evaluate_module(&source).await,
        Err(EvaluatorError::Closed)
    ));
    // A second close is a no-op on the wire.
    evaluator.close().await;
}

#[tokio::test]
async fn test_dropped_evaluator_is_closed() {
    let (manager, mut server) = support::connect();
    let (evaluator, _) = tokio::join!(
        manager.new_evaluator(EvaluatorOptions::default()),
        server.accept_evaluator(11),
    );
    drop(evaluator.expect("evaluator should be created"));
    assert_eq!(
        server.expect_message().await,
        OutgoingMessage::CloseEvaluator { evaluator_id: 11 }
    );

    // The session is gone, so callbacks for it go unanswered and the
    // connection keeps serving new evaluators.
    server
        .send(IncomingMessage::ReadModule(read_request(11, 1, "greet:/x")))
        .await;
    let (evaluator, _) = tokio::join!(
        manager.new_evaluator(EvaluatorOptions::default()),
        server.accept_evaluator(12),
    );
    assert_eq!(evaluator.expect("evaluator should be created").id(), 12);
}

#[tokio::test]
async fn test_module_reader_callback() {
    let (manager, mut server) = support::connect();
    let options = EvaluatorOptions::default().with_module_reader(Greetings);
    let (evaluator, create) = tokio::join!(manager.new_evaluator(options), server.accept_evaluator(4));
    let evaluator = evaluator.expect("evaluator should be created");

    let specs = create.client_module_readers.expect("module readers should be advertised");
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].scheme, "greet");
    assert!(specs[0].is_local);

    let source = ModuleSource::uri("greet:/world").expect("uri should parse");
    let (result, ()) = tokio::join!(evaluator.evaluate_module(&source), async {
        let evaluate = server.expect_evaluate().await;
        server
            .send(IncomingMessage::ReadModule(read_request(4, 100, "greet:/world")))
            .await;
        assert_eq!(
            server.expect_message().await,
            OutgoingMessage::ReadModuleResponse {
                request_id: 100,
                evaluator_id: 4,
                result: Ok("greeting = \"hello /world\"".to_string()),
            }
        );

        server
            .send(IncomingMessage::ListModules(read_request(4, 101, "greet:/")))
            .await;
        assert_eq!(
            server.expect_message().await,
            OutgoingMessage::ListModulesResponse {
                request_id: 101,
                evaluator_id: 4,
                result: Ok(vec![
                    PathElement::new("hello.pkl", false),
                    PathElement::new("nested", true),
                ]),
            }
        );
        server
            .reply_value(&evaluate, &dynamic(&[("greeting", Value::from("hello /world"))]))
            .await;
    });
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_callback_errors_become_replies() {
    let (manager, mut server) = support::connect();
    let options = EvaluatorOptions::default().with_resource_reader(Broken);
    let (evaluator, _) = tokio::join!(manager.new_evaluator(options), server.accept_evaluator(2));
    let _evaluator = evaluator.expect("evaluator should be created");

    server
        .send(IncomingMessage::ReadResource(read_request(2, 1, "broken:thing")))
        .await;
    assert_eq!(
        server.expect_message().await,
        OutgoingMessage::ReadResourceResponse {
            request_id: 1,
            evaluator_id: 2,
            result: Err("disk on fire".to_string()),
        }
    );

    server
        .send(IncomingMessage::ReadResource(read_request(2, 2, "nothing:here")))
        .await;
    assert_eq!(
        server.expect_message().await,
        OutgoingMessage::ReadResourceResponse {
            request_id: 2,
            evaluator_id: 2,
            result: Err("No resource reader found for scheme nothing:".to_string()),
        }
    );

    server
        .send(IncomingMessage::ListResources(read_request(2, 3, "::bad")))
        .await;
    match server.expect_message().await {
        OutgoingMessage::ListResourcesResponse {
            request_id: 3,
            result: Err(message),
            ..
        } => assert!(message.starts_with("internal error: failed to parse resource url")),
        other => panic!("unexpected reply {other:?}"),
    }

    // Module callbacks never consult resource readers.
    server
        .send(IncomingMessage::ListModules(read_request(2, 4, "broken:thing")))
        .await;
    assert_eq!(
        server.expect_message().await,
        OutgoingMessage::ListModulesResponse {
            request_id: 4,
            evaluator_id: 2,
            result: Err("No module reader found for scheme broken:".to_string()),
        }
    );
}

#[tokio::test]
async fn test_unknown_evaluator_and_bad_records_are_dropped() {
    let (manager, mut server) = support::connect();
    let (evaluator, _) = tokio::join!(
        manager.new_evaluator(EvaluatorOptions::default()),
        server.accept_evaluator(5),
    );
    let evaluator = evaluator.expect("evaluator should be created");

    let source = ModuleSource::text("x = 1");
    let (result, ()) = tokio::join!(
        evaluator.evaluate_expression(&source, "x"),
        async {
            let evaluate = server.expect_evaluate().await;
            // Same request id, wrong evaluator.
            server
                .send(IncomingMessage::EvaluateResponse {
                    request_id: evaluate.request_id,
                    evaluator_id: 999,
                    result: Some(pklwire_value::encode(&Value::Int(0))),
                    error: None,
                })
                .await;
            server
                .send(IncomingMessage::ReadResource(read_request(999, 1, "file:///etc/hosts")))
                .await;
            server
                .send_raw(rmpv::Value::Array(vec![
                    rmpv::Value::from(0x7f),
                    rmpv::Value::Map(vec![]),
                ]))
                .await;
            server
                .send(IncomingMessage::Log {
                    evaluator_id: 5,
                    level: 1,
                    message: "deprecated property".to_string(),
                    frame_uri: "repl:text".to_string(),
                })
                .await;
            server.reply_value(&evaluate, &Value::Int(1)).await;
        }
    );
    assert_eq!(result.expect("evaluation should succeed"), Value::Int(1));
}

#[tokio::test]
async fn test_stream_close_fails_everything() {
    let (manager, mut server) = support::connect();
    let (evaluator, _) = tokio::join!(
        manager.new_evaluator(EvaluatorOptions::default()),
        server.accept_evaluator(6),
    );
    let evaluator = evaluator.expect("evaluator should be created");

    let source = ModuleSource::text("x = 1");
    let (result, ()) = tokio::join!(evaluator.evaluate_module(&source), async {
        server.expect_evaluate().await;
        server.hang_up();
    });
    assert!(matches!(result, Err(EvaluatorError::ConnectionClosed(_))));
    assert!(evaluator.is_closed());
    assert!(matches!(
        manager.new_evaluator(EvaluatorOptions::default()).await,
        Err(EvaluatorError::ConnectionClosed(_))
    ));
}

#[tokio::test]
async fn test_manager_close_fails_pending() {
    let (manager, mut server) = support::connect();
    let (evaluator, _) = tokio::join!(
        manager.new_evaluator(EvaluatorOptions::default()),
        server.accept_evaluator(6),
    );
    let evaluator = evaluator.expect("evaluator should be created");

    let source = ModuleSource::text("x = 1");
    let (result, ()) = tokio::join!(evaluator.evaluate_module(&source), async {
        server.expect_evaluate().await;
        manager.close();
    });
    assert!(matches!(result, Err(EvaluatorError::ConnectionClosed(_))));
    assert!(manager.is_closed());
}

#[tokio::test]
async fn test_create_error() {
    let (manager, mut server) = support::connect();
    let (evaluator, ()) = tokio::join!(manager.new_evaluator(EvaluatorOptions::default()), async {
        let create = server.expect_create().await;
        server
            .send(IncomingMessage::CreateEvaluatorResponse {
                request_id: create.request_id,
                evaluator_id: None,
                error: Some("invalid module path".to_string()),
            })
            .await;
    });
    match evaluator {
        Err(EvaluatorError::CreateFailed(message)) => assert_eq!(message, "invalid module path"),
        other => panic!("expected create failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_output_files() {
    let (manager, mut server) = support::connect();
    let (evaluator, _) = tokio::join!(
        manager.new_evaluator(EvaluatorOptions::default()),
        server.accept_evaluator(8),
    );
    let evaluator = evaluator.expect("evaluator should be created");

    let files: ValueMap = [
        (Value::from("a.yaml"), Value::from("a: 1\n")),
        (Value::from("b/c.json"), Value::from("{}")),
    ]
    .into_iter()
    .collect();
    let source = ModuleSource::text("output {}");
    let (result, ()) = tokio::join!(
        evaluator.evaluate_output_files(&source),
        async {
            let evaluate = server.expect_evaluate().await;
            assert_eq!(evaluate.expr.as_deref(), Some(pklwire_evaluator::OUTPUT_FILES_EXPR));
            server.reply_value(&evaluate, &Value::Map(files.clone())).await;
        }
    );

    let expected: BTreeMap<String, String> = [
        ("a.yaml".to_string(), "a: 1\n".to_string()),
        ("b/c.json".to_string(), "{}".to_string()),
    ]
    .into_iter()
    .collect();
    assert_eq!(result.expect("output files should succeed"), expected);
}

#[cfg(unix)]
#[tokio::test]
async fn test_project_evaluator() {
    let (manager, mut server) = support::connect();
    let project_dir = std::path::Path::new("/work/proj");

    let mut settings = Properties::new();
    settings.insert(
        "externalProperties",
        Value::Map([(Value::from("region"), Value::from("eu"))].into_iter().collect()),
    );
    settings.insert("noCache", Value::Bool(true));
    let mut project = Properties::new();
    project.insert("projectFileUri", Value::from("file:///work/proj/PklProject"));
    project.insert(
        "evaluatorSettings",
        Value::Object(TypedObject {
            class_name: "pkl.EvaluatorSettings".to_string(),
            module_uri: "pkl:EvaluatorSettings".to_string(),
            properties: settings,
        }),
    );
    let project = Value::Object(TypedObject {
        class_name: "pkl.Project".to_string(),
        module_uri: "pkl:Project".to_string(),
        properties: project,
    });

    let options = EvaluatorOptions::default().with_env("HOME", "/home/pkl");
    let (evaluator, ()) = tokio::join!(manager.new_project_evaluator(project_dir, options), async {
        let loader = server.accept_evaluator(1).await;
        assert!(loader.allowed_modules.is_some());

        let evaluate = server.expect_evaluate().await;
        assert_eq!(evaluate.module_uri, "file:///work/proj/PklProject");
        assert_eq!(evaluate.expr.as_deref(), Some("output.value"));
        server.reply_value(&evaluate, &project).await;
        assert_eq!(
            server.expect_message().await,
            OutgoingMessage::CloseEvaluator { evaluator_id: 1 }
        );

        let create = server.accept_evaluator(2).await;
        let expected_props: BTreeMap<String, String> =
            [("region".to_string(), "eu".to_string())].into_iter().collect();
        assert_eq!(create.properties, Some(expected_props));
        assert_eq!(
            create.env.as_ref().and_then(|env| env.get("HOME")).map(String::as_str),
            Some("/home/pkl")
        );
        assert_eq!(create.cache_dir, None);
        let project = create.project.expect("project should be sent");
        assert_eq!(
            project.project_file_uri.as_deref(),
            Some("file:///work/proj/PklProject")
        );
    });
    assert_eq!(evaluator.expect("project evaluator should be created").id(), 2);
}
