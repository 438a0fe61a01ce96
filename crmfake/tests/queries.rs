use crmfake::{prelude::*, uuid::Uuid};

fn ids(collection: &EntityCollection) -> Vec<Uuid> {
    collection.records.iter().map(|record| record.id).collect()
}

fn names(collection: &EntityCollection) -> Vec<String> {
    let mut names: Vec<String> = collection
        .records
        .iter()
        .filter_map(|record| record.get("name").and_then(Value::as_str).map(String::from))
        .collect();
    names.sort();
    names
}

fn seeded(names: &[&str]) -> (FakeOrganizationService, Vec<Uuid>) {
    let service = FakeOrganizationService::new();
    let ids = names
        .iter()
        .map(|name| service.create(Record::new("contact").with("name", *name)).unwrap())
        .collect();
    (service, ids)
}

#[test]
fn equality_condition_selects_one_record() {
    let service = FakeOrganizationService::new();
    let (first, second) = (Uuid::from_u128(1), Uuid::from_u128(2));
    service
        .create(Record::with_id("contact", first).with("name", "Contact 1"))
        .unwrap();
    service
        .create(Record::with_id("contact", second).with("name", "Contact 2"))
        .unwrap();

    let query = QueryExpression::builder("contact")
        .filter(Filter::eq("name", "Contact 1"))
        .build();

    assert_eq!(ids(&service.retrieve_multiple(&query).unwrap()), vec![first]);
}

#[test]
fn in_condition_ignores_value_order() {
    let (service, _) = seeded(&["McDonald", "King", "Smith"]);

    for values in [["McDonald", "King"], ["King", "McDonald"]] {
        let query = QueryExpression::builder("contact")
            .filter(Filter::in_values("name", values))
            .build();

        assert_eq!(
            names(&service.retrieve_multiple(&query).unwrap()),
            ["King", "McDonald"]
        );
    }
}

#[test]
fn string_equality_ignores_case() {
    let (service, _) = seeded(&["McDonald", "King"]);
    let query = QueryExpression::builder("contact")
        .filter(Filter::eq("name", "mcdonald"))
        .build();

    assert_eq!(names(&service.retrieve_multiple(&query).unwrap()), ["McDonald"]);
}

#[test]
fn empty_groups_match_everything_or_nothing() {
    let (service, _) = seeded(&["a", "b", "c"]);

    let all = QueryExpression::builder("contact")
        .filter(Filter::and(Vec::<FilterNode>::new()))
        .build();
    assert_eq!(service.retrieve_multiple(&all).unwrap().len(), 3);

    let none = QueryExpression::builder("contact")
        .filter(Filter::or(Vec::<FilterNode>::new()))
        .build();
    assert!(service.retrieve_multiple(&none).unwrap().is_empty());
}

#[test]
fn nested_groups_combine() {
    let service = FakeOrganizationService::new();
    for (name, city) in [("Ada", "London"), ("Grace", "Arlington"), ("Alan", "London")] {
        service
            .create(Record::new("contact").with("name", name).with("city", city))
            .unwrap();
    }

    let filter = Filter::and([
        FilterNode::from(Filter::eq("city", "London")),
        FilterNode::from(Filter::or([
            Filter::begins_with("name", "Ad"),
            Filter::eq("name", "Grace"),
        ])),
    ]);
    let query = QueryExpression::builder("contact").filter(filter).build();

    assert_eq!(names(&service.retrieve_multiple(&query).unwrap()), ["Ada"]);
}

#[test]
fn negated_operators_match_records_without_the_attribute() {
    let service = FakeOrganizationService::new();
    service
        .create(Record::new("contact").with("name", "Londoner").with("city", "London"))
        .unwrap();
    service
        .create(Record::new("contact").with("name", "Parisian").with("city", "Paris"))
        .unwrap();
    service.create(Record::new("contact").with("name", "Nomad")).unwrap();

    let query = QueryExpression::builder("contact")
        .filter(Filter::ne("city", "London"))
        .build();

    assert_eq!(
        names(&service.retrieve_multiple(&query).unwrap()),
        ["Nomad", "Parisian"]
    );
}

#[test]
fn like_patterns_use_percent_and_underscore() {
    let (service, _) = seeded(&["Contoso Ltd", "Contoso Inc", "Fabrikam"]);

    let query = QueryExpression::builder("contact")
        .filter(Filter::like("name", "contoso%"))
        .build();
    assert_eq!(
        names(&service.retrieve_multiple(&query).unwrap()),
        ["Contoso Inc", "Contoso Ltd"]
    );

    let query = QueryExpression::builder("contact")
        .filter(Filter::like("name", "Contoso _nc"))
        .build();
    assert_eq!(names(&service.retrieve_multiple(&query).unwrap()), ["Contoso Inc"]);
}

#[test]
fn relative_date_operators_reject_wrong_arity() {
    let (service, _) = seeded(&["a"]);

    for values in [Vec::<i64>::new(), vec![1, 2]] {
        let query = QueryExpression::builder("contact")
            .filter(Filter::condition(
                "createdon",
                ConditionOperator::OlderThanXDays,
                values,
            ))
            .build();
        let err = service.retrieve_multiple(&query).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("createdon"));
    }
}

#[test]
fn relative_date_operators_compare_against_now() {
    let service = FakeOrganizationService::new();
    let now = chrono::Utc::now();
    service
        .create(
            Record::new("contact")
                .with("name", "old")
                .with("lastcontactedon", now - chrono::Duration::days(10)),
        )
        .unwrap();
    service
        .create(
            Record::new("contact")
                .with("name", "recent")
                .with("lastcontactedon", now - chrono::Duration::hours(2)),
        )
        .unwrap();

    let older = QueryExpression::builder("contact")
        .filter(Filter::older_than(
            "lastcontactedon",
            ConditionOperator::OlderThanXDays,
            3,
        ))
        .build();
    assert_eq!(names(&service.retrieve_multiple(&older).unwrap()), ["old"]);

    let recent = QueryExpression::builder("contact")
        .filter(Filter::last_x(
            "lastcontactedon",
            ConditionOperator::LastXDays,
            3,
        ))
        .build();
    assert_eq!(names(&service.retrieve_multiple(&recent).unwrap()), ["recent"]);
}

#[test]
fn identity_operators_use_the_caller() {
    let service = FakeOrganizationService::new();
    service.create(Record::new("contact").with("name", "mine")).unwrap();
    service
        .create(
            Record::new("contact")
                .with("name", "theirs")
                .with("ownerid", EntityReference::new("systemuser", Uuid::new_v4())),
        )
        .unwrap();

    let query = QueryExpression::builder("contact")
        .filter(Filter::condition(
            "ownerid",
            ConditionOperator::EqualUserId,
            Vec::<Value>::new(),
        ))
        .build();

    assert_eq!(names(&service.retrieve_multiple(&query).unwrap()), ["mine"]);
}

#[test]
fn unsupported_operators_name_the_operator() {
    let (service, _) = seeded(&["a"]);
    let query = QueryExpression::builder("contact")
        .filter(Filter::condition(
            "createdon",
            ConditionOperator::InFiscalYear,
            [2024],
        ))
        .build();

    let err = service.retrieve_multiple(&query).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotSupported);
    assert!(err.to_string().contains("InFiscalYear"));
}

#[test]
fn unknown_attributes_are_schema_mismatches() {
    let (service, _) = seeded(&["a"]);
    let query = QueryExpression::builder("contact")
        .filter(Filter::eq("shoesize", 42))
        .build();

    let err = service.retrieve_multiple(&query).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    assert!(err.to_string().contains("shoesize"));
}

#[test]
fn attribute_validation_can_be_disabled() {
    let service = FakeOrganizationService::builder()
        .with_config(
            ServiceConfig::builder()
                .with_attribute_validation(false)
                .build(),
        )
        .build();
    service.create(Record::new("contact").with("name", "a")).unwrap();

    let query = QueryExpression::builder("contact")
        .filter(Filter::null("shoesize"))
        .build();

    assert_eq!(service.retrieve_multiple(&query).unwrap().len(), 1);
}

#[test]
fn queries_against_empty_types_return_nothing() {
    let service = FakeOrganizationService::new();
    let query = QueryExpression::builder("lead")
        .filter(Filter::eq("subject", "anything"))
        .build();

    assert!(service.retrieve_multiple(&query).unwrap().is_empty());
}

#[test]
fn hierarchy_cycles_truncate_instead_of_looping() {
    let service = FakeOrganizationService::builder()
        .with_relationship(Relationship::hierarchical(
            "account_parent_account",
            "account",
            "parentaccountid",
        ))
        .build();
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    for (id, parent, name) in [(a, c, "a"), (b, a, "b"), (c, b, "c")] {
        service
            .create(
                Record::with_id("account", id)
                    .with("name", name)
                    .with("parentaccountid", EntityReference::new("account", parent)),
            )
            .unwrap();
    }

    let query = QueryExpression::builder("account")
        .filter(Filter::under("accountid", a))
        .build();

    assert_eq!(names(&service.retrieve_multiple(&query).unwrap()), ["b", "c"]);
}

#[test]
fn distinct_collapses_rows_with_identical_projections() {
    let service = FakeOrganizationService::new();
    for first in ["Ada", "Augusta"] {
        service
            .create(
                Record::new("contact")
                    .with("firstname", first)
                    .with("lastname", "Lovelace"),
            )
            .unwrap();
    }

    let mut query = QueryExpression::builder("contact")
        .columns(["lastname"])
        .build();
    assert_eq!(service.retrieve_multiple(&query).unwrap().len(), 2);

    query.distinct = true;
    assert_eq!(service.retrieve_multiple(&query).unwrap().len(), 1);
}

#[test]
fn executing_a_query_does_not_modify_it() {
    let (service, _) = seeded(&["b", "a"]);
    let query = QueryExpression::builder("contact")
        .columns(["name"])
        .filter(Filter::or([Filter::eq("name", "a"), Filter::eq("name", "b")]))
        .order("name", SortDirection::Asc)
        .page(PagingInfo::new(1, 1))
        .build();
    let before = query.clone();

    service.retrieve_multiple(&query).unwrap();
    service.retrieve_multiple(&query).unwrap();

    assert_eq!(query, before);
}
