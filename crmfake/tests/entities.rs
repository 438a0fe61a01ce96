use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use crmfake::{prelude::*, uuid::Uuid};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
struct Contact {
    #[serde(skip)]
    id: Uuid,
    fullname: String,
    numberofchildren: Option<i64>,
    parentcustomerid: Option<EntityReference>,
    hobbies: Option<BTreeSet<i32>>,
    createdon: Option<DateTime<Utc>>,
}

impl Entity for Contact {
    fn logical_name() -> &'static str {
        "contact"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }
}

#[test]
fn typed_entities_round_trip_through_the_service() {
    let service = FakeOrganizationService::new();
    let account = service
        .create(Record::new("account").with("name", "Contoso"))
        .unwrap();
    let contact = Contact {
        fullname: "Ada Lovelace".to_string(),
        numberofchildren: Some(3),
        parentcustomerid: Some(EntityReference::new("account", account)),
        hobbies: Some(BTreeSet::from([1, 4])),
        ..Default::default()
    };

    let id = service.create_entity(&contact).unwrap();
    let stored: Contact = service.retrieve_entity(id).unwrap();

    assert_eq!(stored.id, id);
    assert_eq!(stored.fullname, contact.fullname);
    assert_eq!(stored.numberofchildren, Some(3));
    assert_eq!(stored.parentcustomerid, contact.parentcustomerid);
    assert_eq!(stored.hobbies, contact.hobbies);
    assert!(stored.createdon.is_some());
}

#[test]
fn typed_entities_are_queryable_as_records() {
    let service = FakeOrganizationService::new();
    for (name, hobbies) in [("Ada", [1, 2]), ("Grace", [2, 3])] {
        service
            .create_entity(&Contact {
                fullname: name.to_string(),
                hobbies: Some(BTreeSet::from(hobbies)),
                ..Default::default()
            })
            .unwrap();
    }

    let query = QueryExpression::builder("contact")
        .filter(Filter::contain_values("hobbies", [3]))
        .build();
    let found = service.retrieve_multiple(&query).unwrap();

    assert_eq!(found.len(), 1);
    let grace = Contact::from_record(&found.records[0]).unwrap();
    assert_eq!(grace.fullname, "Grace");
}

#[test]
fn retrieving_a_missing_entity_is_not_found() {
    let service = FakeOrganizationService::new();
    service
        .create_entity(&Contact {
            fullname: "Ada".to_string(),
            ..Default::default()
        })
        .unwrap();

    let err = service.retrieve_entity::<Contact>(Uuid::new_v4()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
