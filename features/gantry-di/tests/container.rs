use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use gantry_config::ConfigError;
use gantry_di::{
    on_bean, on_missing_bean, on_profile, on_property, Autowired, Bean, BeanList, Beans,
    ContainerError, DiContainer, Exports, Fields, Selector, Value, ACTIVE_PROFILES,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

trait Plugin: Send + Sync {
    fn id(&self) -> &str;
}

impl std::fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Plugin").field(&self.id()).finish()
    }
}

struct Named(&'static str);

impl Plugin for Named {
    fn id(&self) -> &str {
        self.0
    }
}

impl Bean for Named {}

fn plugin(container: &mut DiContainer, name: &'static str) {
    container
        .object(Named(name))
        .unwrap()
        .name(name)
        .export(|named| named as Arc<dyn Plugin>);
}

fn ids(plugins: &[Arc<dyn Plugin>]) -> Vec<&str> {
    plugins.iter().map(|plugin| plugin.id()).collect()
}

struct Api;
impl Bean for Api {}

struct Session;
impl Bean for Session {}

#[test]
fn absent_dependencies_remove_dependents() {
    init_logging();
    let mut container = DiContainer::new();
    container
        .object(Api)
        .unwrap()
        .condition(on_bean(Selector::of::<Session>()));
    container
        .object(Session)
        .unwrap()
        .condition(on_property("session.enabled"));
    container.refresh().unwrap();

    assert!(container.get::<Api>().unwrap().is_none());
    assert!(container.get::<Session>().unwrap().is_none());
    assert!(container.find(Selector::of::<Api>()).unwrap().is_empty());
}

#[test]
fn conditions_do_not_depend_on_registration_order() {
    init_logging();
    let mut container = DiContainer::new();
    container.property("session.enabled", true).unwrap();
    container
        .object(Api)
        .unwrap()
        .condition(on_bean(Selector::of::<Session>()));
    container
        .object(Session)
        .unwrap()
        .condition(on_property("session.enabled"));
    container.refresh().unwrap();

    assert!(container.get::<Api>().unwrap().is_some());
    assert!(container.get::<Session>().unwrap().is_some());
}

#[test]
fn missing_bean_and_profile_conditions() {
    let mut container = DiContainer::new();
    container.property(ACTIVE_PROFILES, "dev, test").unwrap();
    plugin(&mut container, "real");
    container
        .object(Named("fallback"))
        .unwrap()
        .name("fallback")
        .condition(on_missing_bean("real"));
    container
        .object(Api)
        .unwrap()
        .condition(on_profile("test"));
    container
        .object(Session)
        .unwrap()
        .condition(on_profile("prod"));
    container.refresh().unwrap();

    assert_eq!(container.find("fallback").unwrap().len(), 0);
    assert!(container.get::<Api>().unwrap().is_some());
    assert!(container.get::<Session>().unwrap().is_none());
}

#[derive(Default)]
struct Chain {
    first: Beans<dyn Plugin>,
    last: Beans<dyn Plugin>,
}

impl Bean for Chain {
    fn describe(&self, fields: &mut Fields<'_>) {
        fields
            .collect("first", "[one,*]", &self.first)
            .collect("last", "[*,one]", &self.last);
    }
}

#[test]
fn wildcards_place_the_remaining_beans() {
    init_logging();
    let mut container = DiContainer::new();
    plugin(&mut container, "one");
    plugin(&mut container, "two");
    container.object(Chain::default()).unwrap();
    container.refresh().unwrap();

    let chain = container.get::<Chain>().unwrap().unwrap();
    assert_eq!(ids(&chain.first), ["one", "two"]);
    assert_eq!(ids(&chain.last), ["two", "one"]);

    let all = container.collect::<dyn Plugin>("[]?").unwrap();
    assert_eq!(ids(&all), ["one", "two"]);

    let error = container.collect::<dyn Plugin>("[*,*]").unwrap_err();
    assert!(matches!(
        error,
        ContainerError::Config(ConfigError::InvalidTag { .. })
    ));
}

#[test]
fn a_middle_wildcard_keeps_registration_order() {
    let mut container = DiContainer::new();
    for name in ["four", "two", "one", "five", "three"] {
        plugin(&mut container, name);
    }
    container.refresh().unwrap();

    let ordered = container.collect::<dyn Plugin>("[one,*,four]").unwrap();
    assert_eq!(ids(&ordered), ["one", "two", "five", "three", "four"]);
}

#[test]
fn required_collections_need_a_member() {
    let mut container = DiContainer::new();
    container.refresh().unwrap();

    assert!(container.collect::<dyn Plugin>("[]?").unwrap().is_empty());
    assert!(matches!(
        container.collect::<dyn Plugin>("[]"),
        Err(ContainerError::BeanNotFound { .. })
    ));
}

#[test]
fn lists_contribute_their_elements() {
    let mut container = DiContainer::new();
    container
        .objects::<dyn Plugin>(vec![Arc::new(Named("a")) as Arc<dyn Plugin>, Arc::new(Named("b"))])
        .unwrap();
    plugin(&mut container, "c");
    container.refresh().unwrap();

    let all = container.collect::<dyn Plugin>("[]").unwrap();
    assert_eq!(ids(&all), ["a", "b", "c"]);
    assert_eq!(container.get::<BeanList<dyn Plugin>>().unwrap().unwrap().len(), 2);
}

#[derive(Default)]
struct Left {
    right: Autowired<Right>,
}

impl Bean for Left {
    fn describe(&self, fields: &mut Fields<'_>) {
        fields.autowire("right", "", &self.right);
    }
}

#[derive(Default)]
struct Right {
    left: Autowired<Left>,
}

impl Bean for Right {
    fn describe(&self, fields: &mut Fields<'_>) {
        fields.autowire("left", "", &self.left);
    }
}

#[test]
fn fields_may_form_a_cycle() {
    init_logging();
    let mut container = DiContainer::new();
    container.object(Left::default()).unwrap();
    container.object(Right::default()).unwrap();
    container.refresh().unwrap();

    let left = container.get::<Left>().unwrap().unwrap();
    let right = container.get::<Right>().unwrap().unwrap();
    assert!(Arc::ptr_eq(left.right.get().unwrap(), &right));
    assert!(Arc::ptr_eq(right.left.get().unwrap(), &left));
}

#[derive(Default)]
struct Owner {
    service: Autowired<Service>,
}

impl Bean for Owner {
    fn describe(&self, fields: &mut Fields<'_>) {
        fields.autowire("service", "", &self.service);
    }
}

struct Service {
    owner: Arc<Owner>,
}
impl Bean for Service {}

#[test]
fn constructed_beans_may_be_factory_arguments_in_a_cycle() {
    init_logging();
    let mut container = DiContainer::new();
    container.object(Owner::default()).unwrap();
    container
        .factory(|owner: Arc<Owner>| Service { owner })
        .unwrap();
    container.refresh().unwrap();

    let owner = container.get::<Owner>().unwrap().unwrap();
    let service = container.get::<Service>().unwrap().unwrap();
    assert!(Arc::ptr_eq(owner.service.get().unwrap(), &service));
    assert!(Arc::ptr_eq(&service.owner, &owner));
}

#[derive(Default)]
struct Maker {
    batch: usize,
    product: Autowired<Product>,
}

impl Bean for Maker {
    fn describe(&self, fields: &mut Fields<'_>) {
        fields.autowire("product", "", &self.product);
    }
}

struct Product {
    batch: usize,
}
impl Bean for Product {}

#[test]
fn method_receivers_may_need_their_product() {
    init_logging();
    let mut container = DiContainer::new();
    container
        .object(Maker {
            batch: 7,
            ..Maker::default()
        })
        .unwrap();
    container
        .method_factory(Selector::of::<Maker>(), |maker: &Maker| Product {
            batch: maker.batch,
        })
        .unwrap();
    container.refresh().unwrap();

    let maker = container.get::<Maker>().unwrap().unwrap();
    let product = container.get::<Product>().unwrap().unwrap();
    assert!(Arc::ptr_eq(maker.product.get().unwrap(), &product));
    assert_eq!(product.batch, 7);
}

struct Egg {
    _chicken: Arc<Chicken>,
}
impl Bean for Egg {}

struct Chicken {
    _egg: Arc<Egg>,
}
impl Bean for Chicken {}

#[test]
fn factory_arguments_may_not_form_a_cycle() {
    init_logging();
    let mut container = DiContainer::new();
    container
        .factory(|chicken: Arc<Chicken>| Egg { _chicken: chicken })
        .unwrap();
    container
        .factory(|egg: Arc<Egg>| Chicken { _egg: egg })
        .unwrap();

    let error = container.refresh().unwrap_err();
    let ContainerError::CircularWiring { path } = error.root() else {
        panic!("expected a circular wiring error, got {error}");
    };
    assert_eq!(path, &["Egg", "Chicken", "Egg"]);
    assert_eq!(error.wiring_path().unwrap(), ["Egg", "Chicken"]);

    assert!(!container.is_refreshed());
    assert!(matches!(
        container.get::<Egg>(),
        Err(ContainerError::NotRefreshed)
    ));
}

struct Layer(&'static str);
impl Bean for Layer {}

#[test]
fn beans_are_destroyed_in_reverse_wiring_order() {
    init_logging();
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut container = DiContainer::new();

    for (name, depends_on) in [("Z", Some("Y")), ("Y", Some("X")), ("X", None)] {
        let log = log.clone();
        let bean = container
            .object(Layer(name))
            .unwrap()
            .name(name)
            .destroy(move |layer: &Layer| log.lock().unwrap().push(layer.0));
        if let Some(dependency) = depends_on {
            bean.depends_on(dependency);
        }
    }
    container.refresh().unwrap();
    assert!(log.lock().unwrap().is_empty());

    container.close();
    assert_eq!(*log.lock().unwrap(), ["Z", "Y", "X"]);

    container.close();
    assert_eq!(log.lock().unwrap().len(), 3);
}

#[test]
fn duplicates_are_rejected() {
    let mut container = DiContainer::new();
    container.object(Named("a")).unwrap();
    container.object(Named("b")).unwrap();
    assert!(matches!(
        container.refresh(),
        Err(ContainerError::DuplicateRegistration { .. })
    ));
}

#[test]
fn duplicates_removed_by_a_condition_are_fine() {
    let mut container = DiContainer::new();
    container.object(Named("a")).unwrap();
    container
        .object(Named("b"))
        .unwrap()
        .condition(on_property("never.set"));
    container.refresh().unwrap();
    assert_eq!(container.get::<Named>().unwrap().unwrap().0, "a");
}

#[test]
fn ambiguity_is_broken_by_primary() {
    let mut container = DiContainer::new();
    plugin(&mut container, "one");
    plugin(&mut container, "two");
    container.refresh().unwrap();

    let Err(ContainerError::BeanAmbiguous { candidates, .. }) = container.get::<dyn Plugin>()
    else {
        panic!("expected an ambiguous lookup");
    };
    assert_eq!(candidates, ["one", "two"]);
    assert_eq!(container.get_by::<dyn Plugin>("two").unwrap().unwrap().id(), "two");
    assert!(container.get_by::<dyn Plugin>("three").unwrap().is_none());

    let mut container = DiContainer::new();
    plugin(&mut container, "one");
    container
        .object(Named("two"))
        .unwrap()
        .name("two")
        .primary()
        .export(|named| named as Arc<dyn Plugin>);
    container.refresh().unwrap();
    assert_eq!(container.get::<dyn Plugin>().unwrap().unwrap().id(), "two");
}

#[derive(Default)]
struct Logged {
    inner: Autowired<dyn Plugin>,
}

impl Plugin for Logged {
    fn id(&self) -> &str {
        "logged"
    }
}

impl Bean for Logged {
    fn describe(&self, fields: &mut Fields<'_>) {
        fields.autowire("inner", "", &self.inner);
    }
}

#[test]
fn beans_never_receive_themselves() {
    init_logging();
    let mut container = DiContainer::new();
    plugin(&mut container, "base");
    container
        .object(Logged::default())
        .unwrap()
        .primary()
        .export(|logged| logged as Arc<dyn Plugin>);
    container.refresh().unwrap();

    let outer = container.get::<dyn Plugin>().unwrap().unwrap();
    assert_eq!(outer.id(), "logged");
    let logged = container.get::<Logged>().unwrap().unwrap();
    assert_eq!(logged.inner.id(), "base");
}

#[test]
fn sized_exports_are_rejected() {
    let mut container = DiContainer::new();
    container
        .object(Named("a"))
        .unwrap()
        .export(|named| named);
    assert!(matches!(
        container.refresh(),
        Err(ContainerError::ExportNotInterface { .. })
    ));
}

trait Greeter: Send + Sync {}

#[derive(Default)]
struct Holder {
    greeter: Autowired<dyn Plugin>,
}

impl Greeter for Holder {}

impl Bean for Holder {
    fn describe(&self, fields: &mut Fields<'_>) {
        fields.autowire("greeter", "", &self.greeter);
    }

    fn exports(exports: &mut Exports<Self>) {
        exports.export("greeter", |holder| holder as Arc<dyn Greeter>);
    }
}

#[test]
fn exported_fields_are_not_injected() {
    let mut container = DiContainer::new();
    plugin(&mut container, "one");
    container.object(Holder::default()).unwrap();

    let error = container.refresh().unwrap_err();
    assert!(matches!(
        error.root(),
        ContainerError::InjectConflict { bean, field } if bean == "Holder" && field == "greeter"
    ));
}

#[test]
fn removed_beans_leave_no_exports() {
    let mut container = DiContainer::new();
    plugin(&mut container, "one");
    container
        .object(Holder::default())
        .unwrap()
        .condition(on_property("holder.enabled"));
    container.refresh().unwrap();

    assert!(container.get::<dyn Greeter>().unwrap().is_none());
}

#[derive(Default)]
struct Optional {
    plugin: Autowired<dyn Plugin>,
}

impl Bean for Optional {
    fn describe(&self, fields: &mut Fields<'_>) {
        fields.autowire("plugin", "missing?", &self.plugin);
    }
}

#[test]
fn optional_fields_stay_empty() {
    let mut container = DiContainer::new();
    plugin(&mut container, "one");
    container.object(Optional::default()).unwrap();
    container.refresh().unwrap();

    assert!(!container.get::<Optional>().unwrap().unwrap().plugin.is_set());
}

#[derive(Default)]
struct Required {
    plugin: Autowired<dyn Plugin>,
}

impl Bean for Required {
    fn describe(&self, fields: &mut Fields<'_>) {
        fields.autowire("plugin", "missing", &self.plugin);
    }
}

#[test]
fn required_fields_fail_with_the_wiring_path() {
    let mut container = DiContainer::new();
    container.object(Required::default()).unwrap();

    let error = container.refresh().unwrap_err();
    assert!(matches!(error.root(), ContainerError::BeanNotFound { .. }));
    assert_eq!(error.wiring_path().unwrap(), ["Required"]);
}

#[derive(Default)]
struct Server {
    port: Value<u16>,
    host: Value<String>,
    tags: Value<Vec<String>>,
}

impl Bean for Server {
    fn describe(&self, fields: &mut Fields<'_>) {
        fields
            .value("port", "${server.port:=8080}", &self.port)
            .value("host", "${server.host:=${app.host:=localhost}}", &self.host)
            .value("tags", "${server.tags:=}", &self.tags);
    }
}

#[test]
fn values_are_bound_from_properties() {
    let mut container = DiContainer::new();
    container.property("server.port", 9000).unwrap();
    container.property("app.host", "edge").unwrap();
    container.property("server.tags", "a, b").unwrap();
    container.object(Server::default()).unwrap();
    container.refresh().unwrap();

    let server = container.get::<Server>().unwrap().unwrap();
    assert_eq!(*server.port, 9000);
    assert_eq!(*server.host, "edge");
    assert_eq!(*server.tags, ["a", "b"]);
}

#[test]
fn mistyped_values_fail_refresh() {
    let mut container = DiContainer::new();
    container.property("server.port", "eighty").unwrap();
    container.object(Server::default()).unwrap();

    let error = container.refresh().unwrap_err();
    assert!(matches!(
        error.root(),
        ContainerError::Config(ConfigError::PropertyTypeMismatch { .. })
    ));
}

#[derive(Default)]
struct Misconfigured {
    port: Value<u16>,
}

impl Bean for Misconfigured {
    fn describe(&self, fields: &mut Fields<'_>) {
        fields.value("port", "server.port", &self.port);
    }
}

#[test]
fn malformed_value_tags_fail_refresh() {
    let mut container = DiContainer::new();
    container.object(Misconfigured::default()).unwrap();

    let error = container.refresh().unwrap_err();
    assert!(matches!(
        error.root(),
        ContainerError::Config(ConfigError::InvalidTag { .. })
    ));
    assert_eq!(error.wiring_path().unwrap(), ["Misconfigured"]);
}

struct Pool {
    size: usize,
}
impl Bean for Pool {}

struct Connection {
    pool_size: usize,
    label: String,
}
impl Bean for Connection {}

#[test]
fn method_factories_use_their_receiver() {
    let mut container = DiContainer::new();
    container.object(Pool { size: 4 }).unwrap().name("pool");
    container
        .method_factory("pool", |pool: &Pool, label: Value<String>| Connection {
            pool_size: pool.size,
            label: label.to_string(),
        })
        .unwrap()
        .args(["${db.label:=primary}"]);
    container.refresh().unwrap();

    let connection = container.get::<Connection>().unwrap().unwrap();
    assert_eq!(connection.pool_size, 4);
    assert_eq!(connection.label, "primary");
}

#[test]
fn factory_failures_are_reported() {
    let mut container = DiContainer::new();
    container.factory(|| None::<Pool>).unwrap();
    let error = container.refresh().unwrap_err();
    assert!(matches!(
        error.root(),
        ContainerError::FactoryReturnedNil { bean } if bean == "Pool"
    ));

    let mut container = DiContainer::new();
    container
        .factory(|| -> Result<Pool, String> { Err("no database".to_string()) })
        .unwrap();
    let error = container.refresh().unwrap_err();
    let ContainerError::UserCallbackFailed { error: cause, .. } = error.root() else {
        panic!("expected a callback failure, got {error}");
    };
    assert_eq!(cause.to_string(), "no database");

    let mut container = DiContainer::new();
    container
        .factory(|| -> Pool { panic!("exploded") })
        .unwrap();
    let error = container.refresh().unwrap_err();
    assert!(error.to_string().contains("exploded"));
}

#[test]
fn factories_receive_collections_and_optionals() {
    let mut container = DiContainer::new();
    plugin(&mut container, "one");
    plugin(&mut container, "two");
    container
        .factory(
            |plugins: Vec<Arc<dyn Plugin>>, pool: Option<Arc<Pool>>| Connection {
                pool_size: pool.map_or(0, |pool| pool.size),
                label: ids(&plugins).join("+"),
            },
        )
        .unwrap();
    container.refresh().unwrap();

    let connection = container.get::<Connection>().unwrap().unwrap();
    assert_eq!(connection.label, "one+two");
    assert_eq!(connection.pool_size, 0);
}

#[test]
fn too_many_arguments_are_rejected() {
    let mut container = DiContainer::new();
    container
        .factory(|| Pool { size: 1 })
        .unwrap()
        .args(["extra"]);
    assert!(matches!(
        container.refresh(),
        Err(ContainerError::InvalidBeanShape(_))
    ));
}

#[derive(Default)]
struct Pooled {
    pool: Autowired<Pool>,
}

impl Bean for Pooled {
    fn describe(&self, fields: &mut Fields<'_>) {
        fields.autowire("pool", "", &self.pool);
    }
}

#[test]
fn factories_run_once_however_often_they_are_injected() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut container = DiContainer::new();
    container.factory(|_pool: Arc<Pool>| Api).unwrap();
    container.factory(|_pool: Arc<Pool>| Session).unwrap();
    container.object(Pooled::default()).unwrap();
    let counted = calls.clone();
    container
        .factory(move || {
            counted.fetch_add(1, Ordering::SeqCst);
            Pool { size: 2 }
        })
        .unwrap();
    container.refresh().unwrap();
    container.invoke(|pool: Arc<Pool>| assert_eq!(pool.size, 2)).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let pool = container.get::<Pool>().unwrap().unwrap();
    let pooled = container.get::<Pooled>().unwrap().unwrap();
    assert!(Arc::ptr_eq(pooled.pool.get().unwrap(), &pool));
}

struct Wrapper;
impl Greeter for Wrapper {}

impl Bean for Wrapper {
    fn exports(exports: &mut Exports<Self>) {
        exports.embed::<Holder>("holder");
    }
}

struct Forwarder;
impl Greeter for Forwarder {}

impl Bean for Forwarder {
    fn exports(exports: &mut Exports<Self>) {
        exports
            .embed::<Holder>("holder")
            .export("", |forwarder| forwarder as Arc<dyn Greeter>);
    }
}

#[test]
fn embedded_interfaces_must_be_exported_by_the_outer_bean() {
    let mut container = DiContainer::new();
    container.object(Wrapper).unwrap();
    let error = container.refresh().unwrap_err();
    assert!(matches!(
        error.root(),
        ContainerError::ExportNotImplemented { bean, .. } if bean == "Wrapper"
    ));

    let mut container = DiContainer::new();
    container.object(Forwarder).unwrap();
    container.refresh().unwrap();
    assert!(container.get::<dyn Greeter>().unwrap().is_some());
}

#[derive(Default)]
struct Picker {
    plugin: Autowired<dyn Plugin>,
}

impl Bean for Picker {
    fn describe(&self, fields: &mut Fields<'_>) {
        fields.autowire("plugin", "${plugin.name:=one}", &self.plugin);
    }
}

#[test]
fn autowire_tags_may_come_from_properties() {
    let mut container = DiContainer::new();
    container.property("plugin.name", "two").unwrap();
    plugin(&mut container, "one");
    plugin(&mut container, "two");
    container.object(Picker::default()).unwrap();
    container.refresh().unwrap();
    assert_eq!(container.get::<Picker>().unwrap().unwrap().plugin.id(), "two");

    let mut container = DiContainer::new();
    plugin(&mut container, "one");
    plugin(&mut container, "two");
    container.object(Picker::default()).unwrap();
    container.refresh().unwrap();
    assert_eq!(container.get::<Picker>().unwrap().unwrap().plugin.id(), "one");
}
