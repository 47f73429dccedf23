use eav_core::model::context::context_of;
use eav_core::{
    open_db_in_memory, AttributeValue, Data, DataId, DataRepository, OptimizedDataLoader, Schema,
    SqliteDataRepository,
};
use serde_json::json;

fn schema() -> Schema {
    let json = json!({
        "families": {
            "Node": {
                "attributes": {
                    "name": {"type": "string"},
                    "next": {"type": "relation", "options": {"autoload": true}},
                    "peer": {"type": "relation"}
                },
                "attribute_as_label": "name"
            },
            "Note": {
                "value_class": "contextual",
                "attributes": {
                    "title": {"type": "string", "context_mask": ["language"]},
                    "author": {"type": "relation", "context_mask": [], "options": {"autoload": true}}
                }
            }
        }
    });
    Schema::from_json_str(&json.to_string()).unwrap()
}

fn node(repo: &SqliteDataRepository<'_>, name: &str) -> Data {
    let mut data = repo.schema().create_data("Node").unwrap();
    data.set_value("name", name, None).unwrap();
    repo.save(&mut data).unwrap();
    data
}

fn link(repo: &SqliteDataRepository<'_>, from: &mut Data, code: &str, to: &Data) {
    from.set_value(code, to.id().unwrap(), None).unwrap();
    repo.save(from).unwrap();
}

fn id(data: &Data) -> DataId {
    data.id().unwrap()
}

#[test]
fn cyclic_autoload_relations_terminate() {
    let schema = schema();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDataRepository::try_new(&conn, &schema).unwrap();
    let mut a = node(&repo, "A");
    let mut b = node(&repo, "B");
    link(&repo, &mut a, "next", &b);
    link(&repo, &mut b, "next", &a);

    let mut loader = OptimizedDataLoader::new(&conn, &schema);
    let graph = loader.load_ids(&[id(&a)], 3).unwrap();

    assert_eq!(graph.len(), 2);
    assert!(loader.is_loaded(id(&a)));
    assert!(loader.is_loaded(id(&b)));
    let next = graph.related(id(&a), "next").unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].label(), "B");
    assert!(next[0].has_loaded_values());
    let back = graph.related(id(&b), "next").unwrap();
    assert_eq!(back[0].id(), a.id());
}

#[test]
fn depth_bounds_the_prefetch() {
    let schema = schema();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDataRepository::try_new(&conn, &schema).unwrap();
    let mut a = node(&repo, "A");
    let mut b = node(&repo, "B");
    let c = node(&repo, "C");
    link(&repo, &mut b, "next", &c);
    link(&repo, &mut a, "next", &b);

    let mut loader = repo.loader();
    let graph = loader.load_ids(&[id(&a)], 0).unwrap();
    let b_shell = graph.get(id(&b)).unwrap();
    assert!(!b_shell.has_loaded_values());
    assert!(!graph.contains(id(&c)));

    loader.reset();
    let graph = loader.load_ids(&[id(&a)], 1).unwrap();
    assert!(graph.get(id(&b)).unwrap().has_loaded_values());
    let c_shell = graph.related(id(&b), "next").unwrap();
    assert_eq!(c_shell.len(), 1);
    assert!(!c_shell[0].has_loaded_values());
    assert!(graph.related(id(&c), "next").is_err());
    assert_eq!(graph.roots().count(), 1);
}

#[test]
fn plain_relations_are_not_followed() {
    let schema = schema();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDataRepository::try_new(&conn, &schema).unwrap();
    let mut a = node(&repo, "A");
    let d = node(&repo, "D");
    link(&repo, &mut a, "peer", &d);

    let mut loader = repo.loader();
    let graph = loader.load_ids(&[id(&a)], 5).unwrap();

    assert!(!loader.is_loaded(id(&d)));
    let peers = graph.related(id(&a), "peer").unwrap();
    assert_eq!(peers.len(), 1);
    assert!(!peers[0].has_loaded_values());
}

#[test]
fn roots_from_several_value_classes_are_hydrated() {
    let schema = schema();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDataRepository::try_new(&conn, &schema).unwrap();
    let author = node(&repo, "Ada");
    let english = context_of([("language", "en")]);
    let mut note = schema.create_data("Note").unwrap();
    note.set_value("title", "Notes", Some(&english)).unwrap();
    note.set_value("author", id(&author), None).unwrap();
    repo.save(&mut note).unwrap();

    let mut loader = repo.loader();
    let graph = loader.load_ids(&[id(&note), id(&author)], 1).unwrap();

    let roots: Vec<&Data> = graph.roots().collect();
    assert_eq!(roots.len(), 2);
    assert_eq!(roots[0].id(), note.id());
    assert_eq!(roots[1].id(), author.id());
    assert!(roots.iter().all(|data| data.has_loaded_values()));
    assert_eq!(
        roots[0].peek("title", Some(&english)).unwrap(),
        AttributeValue::single("Notes")
    );
    assert_eq!(roots[1].peek("name", None).unwrap(), AttributeValue::single("Ada"));
    assert_eq!(graph.related(id(&note), "author").unwrap()[0].label(), "Ada");
}

#[test]
fn transient_roots_and_unknown_ids() {
    let schema = schema();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDataRepository::try_new(&conn, &schema).unwrap();

    let mut transient = schema.create_data("Node").unwrap();
    transient.set_value("name", "draft", None).unwrap();
    let mut loader = repo.loader();
    let graph = loader.load(vec![transient], 2).unwrap();
    assert_eq!(graph.len(), 1);
    let root = graph.roots().next().unwrap();
    assert!(root.is_new());
    assert_eq!(root.peek("name", None).unwrap(), AttributeValue::single("draft"));

    let missing = loader.load_ids(&[uuid::Uuid::new_v4()], 1).unwrap();
    assert!(missing.is_empty());
}

#[test]
fn values_in_memory_survive_a_reload() {
    let schema = schema();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDataRepository::try_new(&conn, &schema).unwrap();
    let a = node(&repo, "A");

    let mut edited = repo.find(id(&a)).unwrap().unwrap();
    edited.set_value("name", "edited", None).unwrap();

    let mut loader = repo.loader();
    let graph = loader.load(vec![edited], 0).unwrap();
    let root = graph.get(id(&a)).unwrap();
    assert_eq!(root.peek("name", None).unwrap(), AttributeValue::single("edited"));
}

#[test]
fn reused_loader_still_hydrates_roots() {
    let schema = schema();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDataRepository::try_new(&conn, &schema).unwrap();
    let mut a = node(&repo, "A");
    let b = node(&repo, "B");
    link(&repo, &mut a, "next", &b);

    let mut loader = repo.loader();
    loader.load_ids(&[id(&a)], 1).unwrap();
    let graph = loader.load_ids(&[id(&a), id(&a)], 1).unwrap();

    assert_eq!(graph.roots().count(), 1);
    let root = graph.get(id(&a)).unwrap();
    assert_eq!(root.peek("name", None).unwrap(), AttributeValue::single("A"));
    assert_eq!(
        root.peek("next", None).unwrap(),
        AttributeValue::single(id(&b))
    );
    assert!(loader.is_loaded(id(&b)));
}
