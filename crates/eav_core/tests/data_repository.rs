use eav_core::model::context::context_of;
use eav_core::{
    open_db_in_memory, AttributeValue, Data, DataId, DataRepository, EavError, RepoError,
    RepoResult, Schema, SqliteDataRepository, ValidationError, ValueData,
};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn schema() -> Schema {
    let json = json!({
        "families": {
            "User": {
                "attributes": {"email": {"type": "email", "required": true, "unique": true}},
                "attribute_as_label": "email",
                "attribute_as_identifier": "email"
            },
            "Item": {
                "instantiable": false,
                "attributes": {"name": {"type": "string", "required": true, "unique": true}},
                "attribute_as_label": "name"
            },
            "Product": {
                "parent": "Item",
                "attributes": {
                    "price": {"type": "decimal"},
                    "tags": {"type": "string", "collection": true},
                    "owner": {"type": "relation", "options": {"allowed_families": ["User"]}}
                }
            },
            "Page": {
                "value_class": "contextual",
                "attributes": {
                    "owner": {
                        "type": "relation",
                        "context_mask": [],
                        "options": {"allowed_families": "User"}
                    },
                    "translatedLabel": {"type": "string", "context_mask": ["language"]}
                }
            },
            "Settings": {
                "singleton": true,
                "attributes": {
                    "theme": {"type": "string", "required": true, "default": "light"},
                    "keywords": {"type": "string", "collection": true, "required": true, "default": ["x"]}
                }
            },
            "Image": {"attributes": {"url": {"type": "string"}}},
            "Gallery": {
                "attributes": {
                    "cover": {"type": "embed"},
                    "images": {"type": "relation", "collection": true, "options": {"orphan_removal": true}},
                    "related": {"type": "relation", "collection": true}
                }
            }
        }
    });
    Schema::from_json_str(&json.to_string()).unwrap()
}

fn product(
    repo: &SqliteDataRepository<'_>,
    name: &str,
    price: f64,
    tags: &[&str],
) -> (Data, RepoResult<DataId>) {
    let mut data = repo.schema().create_data("Product").unwrap();
    data.set_value("name", name, None).unwrap();
    data.set_value("price", price, None).unwrap();
    data.set_values(
        "tags",
        tags.iter().map(|tag| ValueData::from(*tag)).collect(),
        None,
    )
    .unwrap();
    let saved = repo.save(&mut data);
    (data, saved)
}

fn user(repo: &SqliteDataRepository<'_>, email: &str) -> Data {
    let mut data = repo.schema().create_data("User").unwrap();
    data.set_value("email", email, None).unwrap();
    repo.save(&mut data).unwrap();
    data
}

fn image(repo: &SqliteDataRepository<'_>, url: &str) -> Data {
    let mut data = repo.schema().create_data("Image").unwrap();
    data.set_value("url", url, None).unwrap();
    repo.save(&mut data).unwrap();
    data
}

fn count_values(conn: &Connection, table: &str, attribute: &str) -> i64 {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE attribute_code = ?1;"),
        [attribute],
        |row| row.get(0),
    )
    .unwrap()
}

fn count_data(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM eav_data;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn product_catalog_filters_and_collections() {
    let schema = schema();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDataRepository::try_new(&conn, &schema).unwrap();

    let (first, saved) = product(&repo, "A", 10.0, &[]);
    let first_id = saved.unwrap();
    let (_, saved) = product(&repo, "B", 20.0, &["x", "y"]);
    let second_id = saved.unwrap();

    let by_name = repo
        .find_by("Product", &[("name", AttributeValue::single("A"))])
        .unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].id(), Some(first_id));
    assert_eq!(by_name[0].id(), first.id());

    let by_price = repo
        .find_by(
            "Product",
            &[("price", AttributeValue::collection([10, 20]))],
        )
        .unwrap();
    let mut ids: Vec<Uuid> = by_price.iter().filter_map(Data::id).collect();
    ids.sort();
    let mut expected = vec![first_id, second_id];
    expected.sort();
    assert_eq!(ids, expected);

    let mut loaded = repo.find(second_id).unwrap().unwrap();
    assert_eq!(
        loaded.get("tags", None).unwrap(),
        AttributeValue::Collection(vec![ValueData::from("x"), ValueData::from("y")])
    );
    assert_eq!(
        loaded.get("price", None).unwrap(),
        AttributeValue::Single(ValueData::Decimal(20.0))
    );
    assert_eq!(loaded.label(), "B");

    assert_eq!(repo.find_by_family("Item").unwrap().len(), 2);
    assert!(repo.find(Uuid::new_v4()).unwrap().is_none());
}

#[test]
fn translated_values_are_matched_per_language() {
    let schema = schema();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDataRepository::try_new(&conn, &schema).unwrap();
    let owner = user(&repo, "owner@example.com");

    let english = context_of([("language", "en")]);
    let french = context_of([("language", "fr")]);
    let mut page = schema.create_data("Page").unwrap();
    page.set_value("owner", owner.id().unwrap(), Some(&english))
        .unwrap();
    page.set_value("translatedLabel", "Hello", Some(&english))
        .unwrap();
    repo.save(&mut page).unwrap();

    let labelled_in = |context| {
        let qb = repo.query("Page").unwrap().with_context(context);
        let label = qb
            .attribute("translatedLabel")
            .unwrap()
            .is_not_null()
            .unwrap();
        qb.apply(&label).unwrap();
        repo.fetch(&qb).unwrap()
    };
    assert!(labelled_in(french.clone()).is_empty());
    assert_eq!(labelled_in(english.clone()).len(), 1);

    let mut loaded = repo.find(page.id().unwrap()).unwrap().unwrap();
    assert_eq!(
        loaded.get("translatedLabel", Some(&french)).unwrap(),
        AttributeValue::Single(ValueData::Null)
    );
    assert_eq!(
        loaded.get("translatedLabel", Some(&english)).unwrap(),
        AttributeValue::single("Hello")
    );
    assert_eq!(
        loaded.get("owner", Some(&french)).unwrap(),
        AttributeValue::single(owner.id().unwrap())
    );
}

#[test]
fn required_defaults_are_persisted_once() {
    let schema = schema();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDataRepository::try_new(&conn, &schema).unwrap();

    let mut settings = schema.create_data("Settings").unwrap();
    for _ in 0..3 {
        assert_eq!(
            settings.get("keywords", None).unwrap(),
            AttributeValue::collection(["x"])
        );
        assert_eq!(settings.get("theme", None).unwrap(), AttributeValue::single("light"));
    }
    repo.save(&mut settings).unwrap();
    repo.save(&mut settings).unwrap();

    assert_eq!(count_values(&conn, "eav_value", "keywords"), 1);
    assert_eq!(count_values(&conn, "eav_value", "theme"), 1);

    settings.set_value("theme", "dark", None).unwrap();
    repo.save(&mut settings).unwrap();
    let mut loaded = repo.find(settings.id().unwrap()).unwrap().unwrap();
    assert_eq!(loaded.get("theme", None).unwrap(), AttributeValue::single("dark"));
    assert_eq!(count_values(&conn, "eav_value", "theme"), 1);
}

#[test]
fn singleton_instance_is_created_once() {
    let schema = schema();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDataRepository::try_new(&conn, &schema).unwrap();

    let first = repo.get_instance("Settings").unwrap();
    let second = repo.get_instance("Settings").unwrap();
    assert!(first.id().is_some());
    assert_eq!(first.id(), second.id());

    assert!(matches!(
        repo.get_instance("User"),
        Err(RepoError::Eav(EavError::Logic(_)))
    ));
}

#[test]
fn attribute_access_is_limited_to_the_family() {
    let schema = schema();
    let mut product = schema.create_data("Product").unwrap();

    assert!(matches!(
        product.get("translatedLabel", None),
        Err(EavError::MissingAttribute { attribute, .. }) if attribute == "translatedLabel"
    ));
    assert!(matches!(
        product.set_value("url", "https://example.com", None),
        Err(EavError::MissingAttribute { .. })
    ));
}

#[test]
fn save_validates_before_writing() {
    let schema = schema();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDataRepository::try_new(&conn, &schema).unwrap();

    let mut nameless = schema.create_data("Product").unwrap();
    nameless.set_value("price", 5.0, None).unwrap();
    match repo.save(&mut nameless) {
        Err(RepoError::Validation(ValidationError::MissingRequired { family, attribute })) => {
            assert_eq!(family, "Product");
            assert_eq!(attribute, "name");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(count_data(&conn), 0);

    product(&repo, "A", 10.0, &[]).1.unwrap();
    match product(&repo, "A", 11.0, &[]).1 {
        Err(RepoError::UniqueViolation {
            family,
            attribute,
            value,
        }) => {
            assert_eq!(family, "Product");
            assert_eq!(attribute, "name");
            assert_eq!(value, "A");
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let (other, saved) = product(&repo, "B", 12.0, &[]);
    saved.unwrap();
    let (mut third, saved) = product(&repo, "C", 13.0, &[]);
    saved.unwrap();
    third.set_value("owner", other.id().unwrap(), None).unwrap();
    assert!(matches!(
        repo.save(&mut third),
        Err(RepoError::Validation(ValidationError::ForbiddenRelationTarget { .. }))
    ));
    assert_eq!(count_data(&conn), 3);
}

#[test]
fn updates_replace_and_delete_collection_values() {
    let schema = schema();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDataRepository::try_new(&conn, &schema).unwrap();

    let (data, saved) = product(&repo, "A", 10.0, &["x", "y", "z"]);
    let id = saved.unwrap();
    let created_at = data.created_at();
    assert_eq!(count_values(&conn, "eav_value", "tags"), 3);

    let mut loaded = repo.find(id).unwrap().unwrap();
    assert!(loaded.remove("tags", "y", None).unwrap());
    loaded.add("tags", "w", None).unwrap();
    repo.save(&mut loaded).unwrap();

    let mut reloaded = repo.find(id).unwrap().unwrap();
    assert_eq!(
        reloaded.get("tags", None).unwrap(),
        AttributeValue::collection(["x", "z", "w"])
    );
    assert_eq!(count_values(&conn, "eav_value", "tags"), 3);
    assert_eq!(reloaded.created_at(), created_at);

    let found = repo
        .find_one_by("Product", &[("tags", AttributeValue::single("w"))])
        .unwrap();
    assert_eq!(found.and_then(|data| data.id()), Some(id));
}

#[test]
fn identifier_lookup_and_referers() {
    let schema = schema();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDataRepository::try_new(&conn, &schema).unwrap();

    let mut bob = user(&repo, "bob@example.com");
    let (mut lamp, saved) = product(&repo, "Lamp", 15.0, &[]);
    saved.unwrap();
    lamp.set_value("owner", bob.id().unwrap(), None).unwrap();
    repo.save(&mut lamp).unwrap();

    let found = repo
        .find_by_identifier("User", ValueData::from("bob@example.com"))
        .unwrap()
        .unwrap();
    assert_eq!(found.id(), bob.id());
    assert!(repo
        .find_by_identifier("User", ValueData::from("nobody@example.com"))
        .unwrap()
        .is_none());
    assert!(matches!(
        repo.find_by_identifier("Product", ValueData::from("Lamp")),
        Err(RepoError::Eav(EavError::Logic(_)))
    ));

    assert!(matches!(bob.referers(), Err(EavError::ValuesNotLoaded)));
    repo.load_referers(&mut bob).unwrap();
    let referers = bob.referers().unwrap();
    assert_eq!(referers.len(), 1);
    assert_eq!(referers[0].attribute_code(), "owner");
    assert_eq!(referers[0].data_id(), lamp.id());
}

#[test]
fn remove_cascades_to_owned_data_only() {
    let schema = schema();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDataRepository::try_new(&conn, &schema).unwrap();

    let cover = image(&repo, "cover.png");
    let owned = image(&repo, "owned.png");
    let shared = image(&repo, "shared.png");

    let mut gallery = schema.create_data("Gallery").unwrap();
    gallery.set_value("cover", cover.id().unwrap(), None).unwrap();
    gallery.add("images", owned.id().unwrap(), None).unwrap();
    gallery.add("related", shared.id().unwrap(), None).unwrap();
    let gallery_id = repo.save(&mut gallery).unwrap();
    assert_eq!(count_data(&conn), 4);

    assert_eq!(repo.remove(gallery_id).unwrap(), 3);
    assert_eq!(count_data(&conn), 1);
    assert!(repo.find(shared.id().unwrap()).unwrap().is_some());
    assert!(repo.find(cover.id().unwrap()).unwrap().is_none());
    assert_eq!(count_values(&conn, "eav_value", "cover"), 0);

    assert!(matches!(
        repo.remove(gallery_id),
        Err(RepoError::NotFound(id)) if id == gallery_id
    ));
}

#[test]
fn removing_a_target_nulls_relation_values() {
    let schema = schema();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDataRepository::try_new(&conn, &schema).unwrap();

    let bob = user(&repo, "bob@example.com");
    let (mut lamp, saved) = product(&repo, "Lamp", 15.0, &[]);
    let lamp_id = saved.unwrap();
    lamp.set_value("owner", bob.id().unwrap(), None).unwrap();
    repo.save(&mut lamp).unwrap();

    repo.remove(bob.id().unwrap()).unwrap();

    let mut loaded = repo.find(lamp_id).unwrap().unwrap();
    assert_eq!(
        loaded.get("owner", None).unwrap(),
        AttributeValue::Single(ValueData::Null)
    );
}
