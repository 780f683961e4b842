// ABOUTME: Integration tests for fragment deployment and explicit sandbox operations
// ABOUTME: Cover interpreter vs service templates, dependency install order and analytics

mod common;

use common::{creds, harness, Harness};
use mockall::mock;
use serde_json::Value;
use sparkbox_sessions::{
    AnalyticsSink, CodeOutput, Credentials, ExecutionResult, Fragment, FragmentDeployer,
    NoopAnalytics, RuntimeError, SandboxOperation, SessionError, SessionState,
};
use std::sync::Arc;

mock! {
    pub Analytics {}

    impl AnalyticsSink for Analytics {
        fn emit(&self, event: &str, properties: Value);
    }
}

fn interpreter_fragment(code: &str) -> Fragment {
    Fragment {
        template: "code-interpreter-v1".to_string(),
        code: code.to_string(),
        file_path: "script.py".to_string(),
        has_additional_dependencies: false,
        install_dependencies_command: String::new(),
        additional_dependencies: vec![],
        port: None,
    }
}

fn nextjs_fragment(port: Option<u16>) -> Fragment {
    Fragment {
        template: "nextjs-developer".to_string(),
        code: "export default function Home() { return <h1>hi</h1> }".to_string(),
        file_path: "pages/index.tsx".to_string(),
        has_additional_dependencies: false,
        install_dependencies_command: String::new(),
        additional_dependencies: vec![],
        port,
    }
}

fn deployer_with(h: &Harness, analytics: Arc<dyn AnalyticsSink>) -> FragmentDeployer {
    FragmentDeployer::new(h.orchestrator.clone(), analytics)
}

fn quiet_deployer(h: &Harness) -> FragmentDeployer {
    deployer_with(h, Arc::new(NoopAnalytics))
}

#[tokio::test]
async fn test_interpreter_fragment_returns_captured_output() {
    let h = harness();
    h.provider.with(|s| {
        s.code_output = CodeOutput {
            stdout: vec!["2\n".to_string()],
            ..Default::default()
        }
    });
    let mut analytics = MockAnalytics::new();
    analytics.expect_emit().never();
    let deployer = deployer_with(&h, Arc::new(analytics));

    let result = deployer
        .process_fragment("p1", &interpreter_fragment("print(1+1)"), &creds())
        .await
        .unwrap();

    let ExecutionResult::Interpreter(result) = result else {
        panic!("expected interpreter result");
    };
    assert!(result.stdout.iter().any(|line| line.contains('2')));
    assert!(result.runtime_error.is_none());
    assert_eq!(result.template, "code-interpreter-v1");
    assert_eq!(h.provider.count("compute_url"), 0);
    assert_eq!(h.provider.count("run_code"), 1);
}

#[tokio::test]
async fn test_service_fragment_returns_url_for_new_session() {
    let h = harness();
    let mut analytics = MockAnalytics::new();
    analytics
        .expect_emit()
        .withf(|event, props| {
            event == "sandbox_created"
                && props["project_id"] == "p2"
                && props["url"].as_str().is_some_and(|u| u.contains("3000"))
                && props.get("code").is_none()
                && props.get("dependencies").is_none()
        })
        .times(1)
        .return_const(());
    let deployer = deployer_with(&h, Arc::new(analytics));

    let result = deployer
        .process_fragment("p2", &nextjs_fragment(Some(3000)), &creds())
        .await
        .unwrap();

    let ExecutionResult::Web(web) = result else {
        panic!("expected web result");
    };
    assert_eq!(h.provider.count("create"), 1);
    assert_eq!(h.provider.count("run_code"), 0);

    let url = url::Url::parse(&web.url).unwrap();
    let host = url.host_str().unwrap();
    assert!(host.contains("3000"));
    assert!(host.contains(web.sbx_id.as_str()));
}

#[tokio::test]
async fn test_service_fragment_uses_template_port() {
    let h = harness();
    h.provider.with(|s| {
        s.service_ports.insert("nextjs-developer".to_string(), 3000);
    });
    let deployer = quiet_deployer(&h);

    deployer
        .process_fragment("p2", &nextjs_fragment(None), &creds())
        .await
        .unwrap();

    assert!(h.provider.calls().contains(&"compute_url:3000".to_string()));
    assert_eq!(h.provider.count("compute_url"), 1);
}

#[tokio::test]
async fn test_service_fragment_falls_back_to_configured_port() {
    let h = harness();
    let deployer = quiet_deployer(&h);

    deployer
        .process_fragment("p2", &nextjs_fragment(None), &creds())
        .await
        .unwrap();

    assert!(h.provider.calls().contains(&"compute_url:80".to_string()));
}

#[tokio::test]
async fn test_dependencies_installed_before_write_and_run() {
    let h = harness();
    let deployer = quiet_deployer(&h);
    let fragment = Fragment {
        has_additional_dependencies: true,
        install_dependencies_command: "pip install numpy".to_string(),
        additional_dependencies: vec!["numpy".to_string()],
        ..interpreter_fragment("import numpy")
    };

    deployer.process_fragment("p1", &fragment, &creds()).await.unwrap();

    let calls = h.provider.calls();
    let install = calls.iter().position(|c| c == "run_command:pip install numpy").unwrap();
    let write = calls.iter().position(|c| c == "write_file:script.py").unwrap();
    let run = calls.iter().position(|c| c == "run_code").unwrap();
    assert!(install < write && write < run);
}

#[tokio::test]
async fn test_failed_install_stops_deployment() {
    let h = harness();
    h.provider.with(|s| s.command_exit_code = 1);
    let deployer = quiet_deployer(&h);
    let fragment = Fragment {
        has_additional_dependencies: true,
        install_dependencies_command: "pip install nonexistent-pkg".to_string(),
        additional_dependencies: vec!["nonexistent-pkg".to_string()],
        ..interpreter_fragment("import nonexistent_pkg")
    };

    let err = deployer
        .process_fragment("p1", &fragment, &creds())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "DEPENDENCY_INSTALL_FAILED");
    assert_eq!(h.provider.count("write_file"), 0);
    assert_eq!(h.provider.count("run_code"), 0);
}

#[tokio::test]
async fn test_runtime_error_is_a_successful_result() {
    let h = harness();
    h.provider.with(|s| {
        s.code_output = CodeOutput {
            stderr: vec!["ZeroDivisionError: division by zero\n".to_string()],
            runtime_error: Some(RuntimeError {
                name: "ZeroDivisionError".to_string(),
                value: "division by zero".to_string(),
                traceback: "ZeroDivisionError: division by zero\n".to_string(),
            }),
            ..Default::default()
        }
    });
    let deployer = quiet_deployer(&h);

    let result = deployer
        .process_fragment("p1", &interpreter_fragment("1/0"), &creds())
        .await
        .unwrap();

    let ExecutionResult::Interpreter(result) = result else {
        panic!("expected interpreter result");
    };
    assert_eq!(result.runtime_error.unwrap().name, "ZeroDivisionError");
}

#[tokio::test]
async fn test_activity_touch_uses_scoped_client_with_token() {
    let h = harness();
    let deployer = quiet_deployer(&h);
    let with_token = Credentials {
        access_token: Some("jwt".to_string()),
        ..creds()
    };

    deployer
        .process_fragment("p1", &interpreter_fragment("print(1)"), &with_token)
        .await
        .unwrap();
    deployer
        .process_fragment("p1", &interpreter_fragment("print(1)"), &creds())
        .await
        .unwrap();

    assert_eq!(h.store.touches(), vec!["p1@user-1", "p1@service"]);
}

#[tokio::test]
async fn test_store_failures_do_not_fail_deployment() {
    let h = harness();
    h.store.with(|s| s.fail_writes = true);
    let deployer = quiet_deployer(&h);

    let result = deployer
        .process_fragment("p1", &interpreter_fragment("print(1)"), &creds())
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_invalid_fragment_never_touches_provider() {
    let h = harness();
    let deployer = quiet_deployer(&h);
    let fragment = Fragment {
        file_path: String::new(),
        ..interpreter_fragment("print(1)")
    };

    let err = deployer
        .process_fragment("p1", &fragment, &creds())
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::InvalidRequest(_)));
    assert!(h.provider.calls().is_empty());
}

#[tokio::test]
async fn test_create_failure_surfaces_error_code() {
    let h = harness();
    h.provider.with(|s| s.fail_create = true);
    let deployer = quiet_deployer(&h);

    let err = deployer
        .process_fragment("p1", &interpreter_fragment("print(1)"), &creds())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "SESSION_CREATE_FAILED");
}

#[tokio::test]
async fn test_pause_and_resume_operations() {
    let h = harness();
    let deployer = quiet_deployer(&h);
    deployer
        .process_fragment("p1", &nextjs_fragment(Some(3000)), &creds())
        .await
        .unwrap();

    let paused = deployer
        .execute_sandbox_operation("p1", SandboxOperation::Pause, &creds())
        .await
        .unwrap();
    assert!(paused.success);
    assert_eq!(paused.session.unwrap().state, SessionState::Paused);

    let resumed = deployer
        .execute_sandbox_operation("p1", SandboxOperation::Resume, &creds())
        .await
        .unwrap();
    let session = resumed.session.unwrap();
    assert_eq!(session.state, SessionState::Live);
    assert_eq!(session.template, "nextjs-developer");
    assert_eq!(h.provider.count("create"), 1);
}

#[tokio::test]
async fn test_operations_without_session_succeed_as_noops() {
    let h = harness();
    let deployer = quiet_deployer(&h);

    for operation in [SandboxOperation::Pause, SandboxOperation::Resume] {
        let outcome = deployer
            .execute_sandbox_operation("p9", operation, &creds())
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.session.is_none());
    }
    assert!(h.provider.calls().is_empty());
}

#[tokio::test]
async fn test_execute_operation_requires_fragment() {
    let h = harness();
    let deployer = quiet_deployer(&h);

    let err = deployer
        .execute_sandbox_operation("p1", SandboxOperation::Execute, &creds())
        .await
        .unwrap_err();
    assert!(err.is_client_error());
}
