use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use crmfake::{prelude::*, request::kinds};

/// Counts creates, then lets the built-in handler do the work.
struct CountingCreate {
    calls: Arc<AtomicUsize>,
}

impl OperationHandler for CountingCreate {
    fn name(&self) -> &str {
        "counting-create"
    }

    fn can_handle(&self, request: &Request) -> bool {
        matches!(request, Request::Create(_))
    }

    fn execute(&self, request: &Request, service: &FakeOrganizationService) -> CrmResult<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        crmfake::memory::handlers::CreateHandler.execute(request, service)
    }
}

/// Answers any request whose name starts with a prefix.
struct Prefixed {
    prefix: &'static str,
    answer: &'static str,
    priority: HandlerPriority,
}

impl OperationHandler for Prefixed {
    fn name(&self) -> &str {
        self.answer
    }

    fn can_handle(&self, request: &Request) -> bool {
        request.kind().starts_with(self.prefix)
    }

    fn execute(&self, request: &Request, _: &FakeOrganizationService) -> CrmResult<Response> {
        Ok(Response::Custom(OrganizationResponse {
            response_name: request.kind().to_string(),
            results: [("answer".to_string(), Value::from(self.answer))].into(),
        }))
    }

    fn priority(&self) -> HandlerPriority {
        self.priority
    }
}

fn answer(response: Response) -> String {
    match response {
        Response::Custom(custom) => custom
            .results
            .get("answer")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        other => panic!("unexpected response {other:?}"),
    }
}

#[test]
fn handlers_registered_for_a_kind_intercept_convenience_calls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let service = FakeOrganizationService::builder()
        .with_handler(
            kinds::CREATE,
            CountingCreate {
                calls: Arc::clone(&calls),
            },
        )
        .build();

    let id = service.create(Record::new("contact")).unwrap();
    service.create(Record::new("account")).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(service.retrieve("contact", id, ColumnSet::All).is_ok());
}

#[test]
fn catch_alls_resolve_specific_before_fallback() {
    let mut service = FakeOrganizationService::new();
    service.register_catch_all(Prefixed {
        prefix: "",
        answer: "fallback",
        priority: HandlerPriority::Fallback,
    });
    service.register_catch_all(Prefixed {
        prefix: "Calculate",
        answer: "calculate",
        priority: HandlerPriority::Specific,
    });

    let calculate = service
        .execute(OrganizationRequest::new("CalculateTotalTime"))
        .unwrap();
    assert_eq!(answer(calculate), "calculate");

    let other = service.execute(OrganizationRequest::new("SendEmail")).unwrap();
    assert_eq!(answer(other), "fallback");
}

#[test]
fn unhandled_requests_are_not_implemented() {
    let service = FakeOrganizationService::new();
    let err = service
        .execute(OrganizationRequest::new("PublishAllXml").with("force", true))
        .unwrap_err();

    assert!(matches!(&err, CrmError::NotImplemented { request } if request == "PublishAllXml"));
    assert!(err.to_string().contains("PublishAllXml"));
}

#[test]
fn configured_services_can_be_shared_across_threads() {
    let mut service = FakeOrganizationService::new();
    service.register_catch_all(Prefixed {
        prefix: "Ping",
        answer: "pong",
        priority: HandlerPriority::Specific,
    });
    let service = Arc::new(service);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            std::thread::spawn(move || answer(service.execute(OrganizationRequest::new("Ping")).unwrap()))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), "pong");
    }
}

#[test]
fn who_am_i_goes_through_the_pipeline() {
    let caller = CallerContext::new(
        crmfake::uuid::Uuid::new_v4(),
        crmfake::uuid::Uuid::new_v4(),
        crmfake::uuid::Uuid::new_v4(),
    );
    let service = FakeOrganizationService::builder()
        .with_caller(caller.clone())
        .build();

    assert_eq!(service.who_am_i().unwrap(), caller);
}
