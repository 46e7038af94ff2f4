//! Whole-engine scenarios: tracking, triggers, sweeps, and restarts.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use tempfile::tempdir;

use proptrack::{
    properties, Bundle, Error, Event, JsonFileStore, MemoryStore, Store, StoreError, Tracked,
    Tracker, TrackingConfiguration,
};

#[derive(Default)]
struct Window {
    name: String,
    width: u32,
    height: u32,
}
impl Tracked for Window {}

fn configure_window(tracker: &Tracker) {
    tracker
        .configure::<Window>()
        .id(|w| w.name.clone())
        .property("width", |w: &Window| w.width, |w, v| w.width = v)
        .property("height", |w: &Window| w.height, |w, v| w.height = v);
}

#[test]
fn window_state_survives_a_restart() {
    let dir = tempdir().unwrap();

    {
        let tracker = Tracker::new(JsonFileStore::new(dir.path()));
        configure_window(&tracker);

        let main = Rc::new(RefCell::new(Window {
            name: "Main".into(),
            width: 800,
            height: 600,
        }));
        tracker.track(&main).unwrap();
        tracker.persist(&main).unwrap();
    }

    // a new tracker over the same store, as after an application restart
    let tracker = Tracker::new(JsonFileStore::new(dir.path()));
    configure_window(&tracker);

    let main = Rc::new(RefCell::new(Window {
        name: "Main".into(),
        ..Default::default()
    }));
    tracker.track(&main).unwrap();

    assert_eq!(main.borrow().width, 800);
    assert_eq!(main.borrow().height, 600);
}

#[test]
fn distinct_identities_never_share_bundles() {
    let store = Rc::new(MemoryStore::new());
    let tracker = Tracker::new(store.clone());
    configure_window(&tracker);

    let x = Rc::new(RefCell::new(Window {
        name: "x".into(),
        width: 100,
        height: 1,
    }));
    tracker.track(&x).unwrap();
    tracker.persist(&x).unwrap();

    let tracker = Tracker::new(store);
    configure_window(&tracker);
    let y = Rc::new(RefCell::new(Window {
        name: "y".into(),
        width: 42,
        height: 2,
    }));
    tracker.track(&y).unwrap();

    // nothing stored for "y": untouched
    assert_eq!(y.borrow().width, 42);
    assert_eq!(y.borrow().height, 2);
}

#[derive(Default)]
struct Document {
    name: String,
    text: String,
    saved: Event,
    closed: Event,
}
impl Tracked for Document {}

fn configure_document(tracker: &Tracker) {
    tracker
        .configure::<Document>()
        .id(|d| d.name.clone())
        .property("text", |d: &Document| d.text.clone(), |d, v| d.text = v)
        .persist_on("saved", |d| d.saved.clone())
        .stop_tracking_on("closed", |d| d.closed.clone());
}

#[test]
fn persist_trigger_writes_current_state() {
    let store = Rc::new(MemoryStore::new());
    let tracker = Tracker::new(store.clone());
    configure_document(&tracker);

    let doc = Rc::new(RefCell::new(Document {
        name: "notes".into(),
        text: "draft".into(),
        ..Default::default()
    }));
    tracker.track(&doc).unwrap();
    assert_eq!(doc.borrow().saved.handler_count(), 1);

    doc.borrow_mut().text = "final".into();
    let saved = doc.borrow().saved.clone();
    saved.raise();

    let bundle = store.get_bundle("notes").unwrap().unwrap();
    assert_eq!(bundle.get("text"), Some(&json!("final")));
}

#[test]
fn triggers_attach_only_after_the_first_apply() {
    let store = Rc::new(MemoryStore::new());
    let mut seeded = Bundle::new();
    seeded.insert("text".to_string(), json!("stored"));
    store.set_bundle("notes", seeded).unwrap();

    let tracker = Tracker::new(store.clone());
    let raised = Rc::new(std::cell::Cell::new(0u32));
    let in_hook = raised.clone();
    tracker
        .configure::<Document>()
        .id(|d| d.name.clone())
        .property("text", |d: &Document| d.text.clone(), |d, v| d.text = v)
        .persist_on("saved", |d| d.saved.clone())
        .when_applying_property(move |d, _| {
            d.saved.raise();
            in_hook.set(in_hook.get() + 1);
        });

    let doc = Rc::new(RefCell::new(Document {
        name: "notes".into(),
        text: "draft".into(),
        ..Default::default()
    }));
    tracker.track(&doc).unwrap();

    // the raise inside the hook found no subscription yet, so the stored
    // bundle was not overwritten with in-flight state
    assert_eq!(raised.get(), 1);
    assert_eq!(doc.borrow().text, "stored");
    assert_eq!(
        store.get_bundle("notes").unwrap().unwrap().get("text"),
        Some(&json!("stored"))
    );

    // once tracking is established the same event persists current state
    doc.borrow_mut().text = "edited".into();
    let saved = doc.borrow().saved.clone();
    saved.raise();
    assert_eq!(
        store.get_bundle("notes").unwrap().unwrap().get("text"),
        Some(&json!("edited"))
    );
}

#[test]
fn stop_tracking_trigger_detaches_everything() {
    let store = Rc::new(MemoryStore::new());
    let tracker = Tracker::new(store.clone());
    configure_document(&tracker);

    let doc = Rc::new(RefCell::new(Document {
        name: "notes".into(),
        text: "draft".into(),
        ..Default::default()
    }));
    tracker.track(&doc).unwrap();

    let closed = doc.borrow().closed.clone();
    closed.raise();

    // persist trigger handlers are gone and the target left the registry
    assert_eq!(doc.borrow().saved.handler_count(), 0);
    assert!(matches!(tracker.persist(&doc), Err(Error::NotTracked)));

    doc.borrow_mut().text = "changed".into();
    tracker.persist_all();
    assert!(store.get_bundle("notes").unwrap().is_none());
}

#[test]
fn global_signal_persists_everything_once_wired() {
    let store = Rc::new(MemoryStore::new());
    let tracker = Tracker::new(store.clone());
    configure_window(&tracker);

    let shutdown = Event::new();
    let wired = tracker.auto_persist_on(&shutdown);

    let main = Rc::new(RefCell::new(Window {
        name: "Main".into(),
        width: 640,
        height: 480,
    }));
    tracker.track(&main).unwrap();

    shutdown.raise();
    assert_eq!(
        store
            .get_bundle("Main")
            .unwrap()
            .unwrap()
            .get("width"),
        Some(&json!(640))
    );

    // after disconnecting, the signal no longer reaches the tracker
    wired.unsubscribe();
    main.borrow_mut().width = 9999;
    shutdown.raise();
    assert_eq!(
        store
            .get_bundle("Main")
            .unwrap()
            .unwrap()
            .get("width"),
        Some(&json!(640))
    );
}

struct Profile {
    user: String,
    theme: String,
}
impl Tracked for Profile {
    fn describe(config: &mut TrackingConfiguration<Self>, _tracker_name: Option<&str>) {
        properties!(config, theme);
    }

    fn configure_tracking(&self, config: &mut TrackingConfiguration<Self>) -> bool {
        let user = self.user.clone();
        config.id(move |_| user.clone());
        true
    }
}

#[test]
fn self_configuring_instances_get_private_configurations() {
    let store = Rc::new(MemoryStore::new());
    let tracker = Tracker::new(store.clone());

    let alice = Rc::new(RefCell::new(Profile {
        user: "alice".into(),
        theme: "dark".into(),
    }));
    let bob = Rc::new(RefCell::new(Profile {
        user: "bob".into(),
        theme: "light".into(),
    }));
    tracker.track(&alice).unwrap();
    tracker.track(&bob).unwrap();
    tracker.persist_all();

    // each instance persisted under its own identity
    assert_eq!(
        store.get_bundle("alice").unwrap().unwrap().get("theme"),
        Some(&json!("dark"))
    );
    assert_eq!(
        store.get_bundle("bob").unwrap().unwrap().get("theme"),
        Some(&json!("light"))
    );

    // the type template still uses the default identity
    let template = tracker.configure::<Profile>();
    assert_eq!(template.property_names(), vec!["theme"]);
    assert!(store.get_bundle("Profile").unwrap().is_none());
}

struct MachinePrefs {
    theme: String,
    cache_dir: String,
}
impl Tracked for MachinePrefs {
    fn describe(config: &mut TrackingConfiguration<Self>, tracker_name: Option<&str>) {
        match tracker_name {
            Some("machine") => {
                properties!(config, cache_dir);
            }
            _ => {
                properties!(config, theme);
            }
        }
    }
}

#[test]
fn named_trackers_see_disjoint_property_subsets() {
    let store = Rc::new(MemoryStore::new());
    let user_tracker = Tracker::named(store.clone(), "user");
    let machine_tracker = Tracker::named(store.clone(), "machine");

    assert_eq!(
        user_tracker.configure::<MachinePrefs>().property_names(),
        vec!["theme"]
    );
    assert_eq!(
        machine_tracker.configure::<MachinePrefs>().property_names(),
        vec!["cache_dir"]
    );
}

/// A store that refuses writes for one identity, for sweep-isolation tests.
struct FlakyStore {
    inner: MemoryStore,
    poison: String,
}

impl Store for FlakyStore {
    fn get_bundle(&self, id: &str) -> Result<Option<proptrack::Bundle>, StoreError> {
        self.inner.get_bundle(id)
    }

    fn set_bundle(&self, id: &str, values: proptrack::Bundle) -> Result<(), StoreError> {
        if id == self.poison {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.set_bundle(id, values)
    }

    fn clear_bundle(&self, id: &str) -> Result<(), StoreError> {
        self.inner.clear_bundle(id)
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        self.inner.clear_all()
    }

    fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_ids()
    }
}

#[test]
fn a_failing_target_never_blocks_the_sweep() {
    let store = Rc::new(FlakyStore {
        inner: MemoryStore::new(),
        poison: "bad".to_string(),
    });
    let tracker = Tracker::new(store.clone());
    configure_window(&tracker);

    let bad = Rc::new(RefCell::new(Window {
        name: "bad".into(),
        width: 1,
        height: 1,
    }));
    let good = Rc::new(RefCell::new(Window {
        name: "good".into(),
        width: 2,
        height: 2,
    }));
    tracker.track(&bad).unwrap();
    tracker.track(&good).unwrap();

    tracker.persist_all();

    assert!(store.get_bundle("bad").unwrap().is_none());
    assert_eq!(
        store.get_bundle("good").unwrap().unwrap().get("width"),
        Some(&json!(2))
    );
}

#[test]
fn nested_and_aliased_paths_round_trip() {
    #[derive(Default)]
    struct Pane {
        title: String,
    }
    #[derive(Default)]
    struct Split {
        left: Pane,
        right: Pane,
    }
    impl Tracked for Split {}

    let store = Rc::new(MemoryStore::new());
    let tracker = Tracker::new(store.clone());
    let cfg = tracker.configure::<Split>();
    properties!(cfg, left_title: left.title, right_title: right.title);

    let split = Rc::new(RefCell::new(Split {
        left: Pane {
            title: "files".into(),
        },
        right: Pane {
            title: "preview".into(),
        },
    }));
    tracker.track(&split).unwrap();
    tracker.persist(&split).unwrap();

    let tracker = Tracker::new(store);
    let cfg = tracker.configure::<Split>();
    properties!(cfg, left_title: left.title, right_title: right.title);

    let restored = Rc::new(RefCell::new(Split::default()));
    tracker.track(&restored).unwrap();
    assert_eq!(restored.borrow().left.title, "files");
    assert_eq!(restored.borrow().right.title, "preview");
}
