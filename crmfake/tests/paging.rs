use std::collections::HashSet;

use crmfake::{prelude::*, uuid::Uuid};

fn seeded(count: usize) -> FakeOrganizationService {
    let service = FakeOrganizationService::new();
    for index in 0..count {
        service
            .create(Record::new("contact").with("index", index as i64))
            .unwrap();
    }
    service
}

fn indexes(collection: &EntityCollection) -> Vec<i64> {
    collection
        .records
        .iter()
        .filter_map(|record| record.get("index").and_then(Value::as_integer))
        .collect()
}

fn next_page(query: &mut QueryExpression, previous: &EntityCollection) {
    let current = query.page_info.clone().unwrap_or_default();
    let mut page = PagingInfo::new(current.page_number.max(1) + 1, current.count);
    page.paging_cookie = previous.paging_cookie.clone();
    page.return_total_record_count = current.return_total_record_count;
    query.page_info = Some(page);
}

#[test]
fn default_page_size_splits_large_results_with_a_cookie() {
    let service = seeded(1050);
    let mut query = QueryExpression::new("contact");

    let first = service.retrieve_multiple(&query).unwrap();
    assert_eq!(first.len(), 1000);
    assert!(first.more_records);
    assert!(first.paging_cookie.is_some());

    next_page(&mut query, &first);
    let second = service.retrieve_multiple(&query).unwrap();
    assert_eq!(second.len(), 50);
    assert!(!second.more_records);

    let seen: HashSet<Uuid> = first
        .records
        .iter()
        .chain(&second.records)
        .map(|record| record.id)
        .collect();
    assert_eq!(seen.len(), 1050);
}

#[test]
fn consecutive_pages_have_no_gap_and_no_overlap() {
    let service = seeded(25);
    let mut query = QueryExpression::builder("contact")
        .order("index", SortDirection::Asc)
        .page(PagingInfo::new(1, 10))
        .build();

    let mut collected = Vec::new();
    loop {
        let page = service.retrieve_multiple(&query).unwrap();
        collected.extend(indexes(&page));
        if !page.more_records {
            break;
        }
        next_page(&mut query, &page);
    }

    assert_eq!(collected, (0..25).collect::<Vec<i64>>());
}

#[test]
fn page_numbers_work_without_cookies() {
    let service = seeded(25);
    let query = QueryExpression::builder("contact")
        .order("index", SortDirection::Desc)
        .page(PagingInfo::new(2, 10))
        .build();

    let page = service.retrieve_multiple(&query).unwrap();
    assert_eq!(indexes(&page), (5..15).rev().collect::<Vec<i64>>());
    assert!(page.more_records);
}

#[test]
fn pages_beyond_the_end_are_empty_without_error() {
    let service = seeded(5);
    let query = QueryExpression::builder("contact")
        .page(PagingInfo::new(3, 5))
        .build();

    let page = service.retrieve_multiple(&query).unwrap();
    assert!(page.is_empty());
    assert!(!page.more_records);
    assert!(page.paging_cookie.is_none());
}

#[test]
fn total_count_ignores_the_page_window() {
    let service = seeded(30);
    let query = QueryExpression::builder("contact")
        .filter(Filter::lt("index", 20))
        .page(PagingInfo::new(1, 5).with_total_count())
        .build();

    let page = service.retrieve_multiple(&query).unwrap();
    assert_eq!(page.len(), 5);
    assert_eq!(page.total_record_count, Some(20));
}

#[test]
fn top_count_overrides_paging() {
    let service = seeded(30);
    let query = QueryExpression::builder("contact")
        .order("index", SortDirection::Asc)
        .top(7)
        .page(PagingInfo::new(2, 5))
        .build();

    let page = service.retrieve_multiple(&query).unwrap();
    assert_eq!(indexes(&page), (0..7).collect::<Vec<i64>>());
    assert!(!page.more_records);
    assert!(page.paging_cookie.is_none());
}

#[test]
fn page_size_is_capped_by_configuration() {
    let service = FakeOrganizationService::builder()
        .with_config(ServiceConfig::builder().with_max_page_size(4).build())
        .build();
    for index in 0..10_i64 {
        service
            .create(Record::new("contact").with("index", index))
            .unwrap();
    }

    let query = QueryExpression::builder("contact")
        .page(PagingInfo::new(1, 50))
        .build();
    let page = service.retrieve_multiple(&query).unwrap();

    assert_eq!(page.len(), 4);
    assert!(page.more_records);
}

#[test]
fn cookies_survive_records_with_equal_sort_keys() {
    let service = FakeOrganizationService::new();
    for index in 0..9_i64 {
        service
            .create(
                Record::new("contact")
                    .with("index", index)
                    .with("bucket", index / 3),
            )
            .unwrap();
    }

    let mut query = QueryExpression::builder("contact")
        .order("bucket", SortDirection::Asc)
        .page(PagingInfo::new(1, 2))
        .build();

    let mut collected = Vec::new();
    loop {
        let page = service.retrieve_multiple(&query).unwrap();
        collected.extend(indexes(&page));
        if !page.more_records {
            break;
        }
        next_page(&mut query, &page);
    }

    assert_eq!(collected, (0..9).collect::<Vec<i64>>());
}

fn collect_all_pages(service: &FakeOrganizationService, mut query: QueryExpression) -> Vec<i64> {
    let mut collected = Vec::new();
    loop {
        let page = service.retrieve_multiple(&query).unwrap();
        collected.extend(indexes(&page));
        if !page.more_records {
            break;
        }
        next_page(&mut query, &page);
    }
    collected
}

#[test]
fn cookies_survive_equal_float_and_money_sort_keys() {
    // Shortest decimal forms of these need the exact float parser to read back.
    let awkward = [0.0014805878740494919_f64, 0.1 + 0.2, 1.0 / 3.0];

    for score in awkward {
        let service = FakeOrganizationService::new();
        for index in 0..5_i64 {
            service
                .create(
                    Record::new("contact")
                        .with("index", index)
                        .with("score", score)
                        .with("revenue", Money(score * 1000.0)),
                )
                .unwrap();
        }

        for attribute in ["score", "revenue"] {
            let query = QueryExpression::builder("contact")
                .order(attribute, SortDirection::Asc)
                .page(PagingInfo::new(1, 2))
                .build();

            assert_eq!(
                collect_all_pages(&service, query),
                (0..5).collect::<Vec<i64>>(),
                "{attribute} = {score}"
            );
        }
    }
}

#[test]
fn huge_page_numbers_are_empty_pages() {
    let service = seeded(5);
    let query = QueryExpression::builder("contact")
        .page(PagingInfo::new(usize::MAX / 2, 10))
        .build();

    let page = service.retrieve_multiple(&query).unwrap();
    assert!(page.is_empty());
    assert!(!page.more_records);
}
