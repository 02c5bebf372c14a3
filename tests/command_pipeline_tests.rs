use archivist::{
    ArchivistError, CastArgs, CastValue, CommandDescriptor, CommandRegistry, DeclaredType, Entity,
    EntityHydrator, ErrorClass, ExecutionContext, FieldRule, InMemoryVault, RawIndex, Topic,
    TypeRegistry, Validate, ValidationCode, ValidationError, ValidationSchema,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerIndex {
    player_id: String,
}

impl Validate for PlayerIndex {
    fn validation_schema() -> ValidationSchema {
        ValidationSchema::new().field(FieldRule::new("playerId").is_string().not_empty())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PlayerData {
    name: String,
}

impl Validate for PlayerData {
    fn validation_schema() -> ValidationSchema {
        ValidationSchema::new().field(FieldRule::new("name").is_string().not_empty())
    }
}

struct Player;

impl Topic for Player {
    const NAME: &'static str = "Player";
    const INDEX: &'static [&'static str] = &["playerId"];

    type Index = PlayerIndex;
    type Data = PlayerData;
}

/// Hydrates after the delay carried in the argument, recording completion order.
struct DelayedHydrator {
    completed: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl EntityHydrator for DelayedHydrator {
    fn topic(&self) -> &str {
        "Delayed"
    }

    async fn hydrate(&self, _ctx: &ExecutionContext, _index: RawIndex, data: Value) -> archivist::Result<CastValue> {
        let delay = data.get("delay").and_then(Value::as_u64).unwrap_or_default();
        let tag = data
            .get("tag")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.completed.lock().await.push(tag.clone());
        Ok(CastValue::of(data, tag))
    }
}

/// Fails with an `InvalidIndex` carrying `tag` after `delay_ms`, counting attempts.
struct FailingHydrator {
    tag: &'static str,
    delay_ms: u64,
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl EntityHydrator for FailingHydrator {
    fn topic(&self) -> &str {
        self.tag
    }

    async fn hydrate(&self, _ctx: &ExecutionContext, _index: RawIndex, _data: Value) -> archivist::Result<CastValue> {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ValidationError::new(ValidationCode::InvalidIndex, self.tag, Vec::new()).into())
    }
}

fn context() -> ExecutionContext {
    ExecutionContext::with_archivist(Arc::new(InMemoryVault::new("memory")))
}

fn types() -> TypeRegistry {
    let mut types = TypeRegistry::with_builtins();
    types.register_entity::<Player>().unwrap();
    types
}

fn rename_descriptor() -> CommandDescriptor {
    CommandDescriptor::new("renamePlayer")
        .param("player", "Player")
        .param("name", "string")
        .acl(&["user"])
        .input(
            ValidationSchema::new()
                .field(FieldRule::new("player").is_object())
                .field(FieldRule::new("name").is_string().not_empty().max_length(8)),
        )
        .output(ValidationSchema::new().field(FieldRule::new("name").is_string().not_empty()))
}

fn counting_registry(calls: Arc<AtomicUsize>) -> CommandRegistry {
    let mut registry = CommandRegistry::new(types());
    registry
        .register(
            rename_descriptor(),
            move |_ctx: ExecutionContext, mut args: CastArgs| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let mut player: Entity<Player> = args.take(0)?;
                    let name: String = args.take(1)?;
                    player.data_mut().name = name;
                    Ok::<Value, ArchivistError>(json!({
                        "playerId": player.index().map(|index| index.player_id.clone()),
                        "name": player.data().name,
                    }))
                }
            },
        )
        .unwrap();
    registry
}

#[tokio::test]
async fn entity_argument_is_hydrated_from_index_and_data() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(calls.clone());

    let result = registry
        .execute(
            &context(),
            "renamePlayer",
            vec![json!({ "index": { "playerId": "p1" }, "name": "Ann" }), json!("Bea")],
        )
        .await
        .unwrap();

    assert_eq!(result, json!({ "playerId": "p1", "name": "Bea" }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hydrated_view_excludes_index() {
    let mut registry = CommandRegistry::new(types());
    registry
        .register(
            CommandDescriptor::new("inspect").param("player", "Player"),
            |_ctx: ExecutionContext, args: CastArgs| async move {
                Ok::<Value, ArchivistError>(args.view(0).cloned().unwrap_or_default())
            },
        )
        .unwrap();

    let view = registry
        .execute(
            &context(),
            "inspect",
            vec![json!({ "index": { "playerId": "p1" }, "name": "Ann" })],
        )
        .await
        .unwrap();

    assert_eq!(view, json!({ "name": "Ann" }));
}

#[tokio::test]
async fn invalid_input_never_reaches_the_body() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(calls.clone());

    let err = registry
        .execute(
            &context(),
            "renamePlayer",
            vec![
                json!({ "index": { "playerId": "p1" }, "name": "Ann" }),
                json!("Bartholomew"),
            ],
        )
        .await
        .unwrap_err();

    let validation = err.validation().unwrap();
    assert_eq!(validation.code, ValidationCode::InvalidUserCommandInput);
    assert_eq!(validation.details[0].property, "name");
    assert_eq!(validation.details[0].constraint, "maxLength");
    assert_eq!(err.class(), ErrorClass::BadInput);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_entity_index_never_reaches_the_body() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(calls.clone());

    let err = registry
        .execute(
            &context(),
            "renamePlayer",
            vec![json!({ "name": "Ann" }), json!("Bea")],
        )
        .await
        .unwrap_err();

    assert_eq!(err.validation_code(), Some(ValidationCode::InvalidIndex));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_arguments_are_null_and_surplus_ignored() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(calls.clone());

    // missing `name` is cast from null, which is not a string
    let err = registry
        .execute(
            &context(),
            "renamePlayer",
            vec![json!({ "index": { "playerId": "p1" }, "name": "Ann" })],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ArchivistError::Transform { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let result = registry
        .execute(
            &context(),
            "renamePlayer",
            vec![
                json!({ "index": { "playerId": "p1" }, "name": "Ann" }),
                json!("Bea"),
                json!("surplus"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(result["name"], "Bea");
}

#[tokio::test]
async fn falsy_entity_argument_is_absent() {
    let mut registry = CommandRegistry::new(types());
    registry
        .register(
            CommandDescriptor::new("maybePlayer").param("player", "Player"),
            |_ctx: ExecutionContext, mut args: CastArgs| async move {
                let player: Option<Entity<Player>> = args.take_optional(0)?;
                Ok::<Value, ArchivistError>(json!(player.is_some()))
            },
        )
        .unwrap();

    let ctx = context();
    let absent = registry.execute(&ctx, "maybePlayer", vec![Value::Null]).await.unwrap();
    assert_eq!(absent, json!(false));

    let present = registry
        .execute(&ctx, "maybePlayer", vec![json!({ "index": { "playerId": "p1" }, "name": "Ann" })])
        .await
        .unwrap();
    assert_eq!(present, json!(true));
}

#[tokio::test]
async fn invalid_object_result_is_rejected() {
    let mut registry = CommandRegistry::new(types());
    registry
        .register(
            rename_descriptor(),
            |_ctx: ExecutionContext, _args: CastArgs| async move {
                Ok::<Value, ArchivistError>(json!({ "name": "" }))
            },
        )
        .unwrap();

    let err = registry
        .execute(
            &context(),
            "renamePlayer",
            vec![json!({ "index": { "playerId": "p1" }, "name": "Ann" }), json!("Bea")],
        )
        .await
        .unwrap_err();

    assert_eq!(
        err.validation_code(),
        Some(ValidationCode::InvalidUserCommandReturnValue)
    );
    assert_eq!(err.class(), ErrorClass::BadOutput);
}

#[tokio::test]
async fn array_results_are_validated_per_item() {
    let mut registry = CommandRegistry::new(types());
    registry
        .register(
            CommandDescriptor::new("listNames")
                .output(ValidationSchema::new().field(FieldRule::new("name").is_string().not_empty())),
            |_ctx: ExecutionContext, _args: CastArgs| async move {
                Ok::<Value, ArchivistError>(json!([{ "name": "Ann" }, { "name": "" }]))
            },
        )
        .unwrap();

    let err = registry
        .execute(&context(), "listNames", Vec::new())
        .await
        .unwrap_err();

    let validation = err.validation().unwrap();
    assert_eq!(validation.code, ValidationCode::InvalidUserCommandReturnValue);
    assert_eq!(validation.details.len(), 1);
    assert_eq!(validation.details[0].property, "[1].name");
}

#[tokio::test]
async fn primitive_results_bypass_output_rules() {
    let mut registry = CommandRegistry::new(types());
    registry
        .register(
            CommandDescriptor::new("count")
                .output(ValidationSchema::new().field(FieldRule::new("name").is_string())),
            |_ctx: ExecutionContext, _args: CastArgs| async move {
                Ok::<Value, ArchivistError>(json!(42))
            },
        )
        .unwrap();

    let result = registry.execute(&context(), "count", Vec::new()).await.unwrap();
    assert_eq!(result, json!(42));
}

#[tokio::test]
async fn arguments_keep_positions_when_casts_finish_out_of_order() {
    let completed = Arc::new(Mutex::new(Vec::new()));
    let mut types = types();
    types
        .register(
            "Delayed",
            DeclaredType::Entity(Arc::new(DelayedHydrator {
                completed: completed.clone(),
            })),
        )
        .unwrap();

    let mut registry = CommandRegistry::new(types);
    registry
        .register(
            CommandDescriptor::new("collect")
                .param("first", "Delayed")
                .param("second", "Delayed")
                .param("third", "Delayed"),
            |_ctx: ExecutionContext, mut args: CastArgs| async move {
                let first: String = args.take(0)?;
                let second: String = args.take(1)?;
                let third: String = args.take(2)?;
                Ok::<Value, ArchivistError>(json!([first, second, third]))
            },
        )
        .unwrap();

    let result = registry
        .execute(
            &context(),
            "collect",
            vec![
                json!({ "tag": "a", "delay": 60 }),
                json!({ "tag": "b", "delay": 30 }),
                json!({ "tag": "c", "delay": 0 }),
            ],
        )
        .await
        .unwrap();

    assert_eq!(result, json!(["a", "b", "c"]));
    assert_eq!(*completed.lock().await, vec!["c", "b", "a"]);
}

#[tokio::test]
async fn first_cast_failure_wins_and_siblings_run_to_completion() {
    let completed = Arc::new(Mutex::new(Vec::new()));
    let attempts = Arc::new(AtomicUsize::new(0));
    let body_calls = Arc::new(AtomicUsize::new(0));

    let mut types = types();
    types
        .register(
            "Delayed",
            DeclaredType::Entity(Arc::new(DelayedHydrator {
                completed: completed.clone(),
            })),
        )
        .unwrap();
    types
        .register(
            "Late",
            DeclaredType::Entity(Arc::new(FailingHydrator {
                tag: "late",
                delay_ms: 60,
                attempts: attempts.clone(),
            })),
        )
        .unwrap();
    types
        .register(
            "Early",
            DeclaredType::Entity(Arc::new(FailingHydrator {
                tag: "early",
                delay_ms: 0,
                attempts: attempts.clone(),
            })),
        )
        .unwrap();

    let mut registry = CommandRegistry::new(types);
    let calls = body_calls.clone();
    registry
        .register(
            CommandDescriptor::new("mixed")
                .param("slow", "Delayed")
                .param("late", "Late")
                .param("early", "Early"),
            move |_ctx: ExecutionContext, _args: CastArgs| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<Value, ArchivistError>(Value::Null)
                }
            },
        )
        .unwrap();

    let err = registry
        .execute(
            &context(),
            "mixed",
            vec![
                json!({ "tag": "slow", "delay": 30 }),
                json!({ "index": {} }),
                json!({ "index": {} }),
            ],
        )
        .await
        .unwrap_err();

    let validation = err.validation().unwrap();
    assert_eq!(validation.code, ValidationCode::InvalidIndex);
    assert_eq!(validation.message, "early");

    // every cast finished before the invocation returned; only the first failure surfaced
    assert_eq!(*completed.lock().await, vec!["slow"]);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(body_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn wrong_instance_type_is_reported() {
    let mut registry = CommandRegistry::new(types());
    registry
        .register(
            CommandDescriptor::new("echo").param("value", "string"),
            |_ctx: ExecutionContext, mut args: CastArgs| async move {
                let value: i64 = args.take(0)?;
                Ok::<Value, ArchivistError>(json!(value))
            },
        )
        .unwrap();

    let err = registry
        .execute(&context(), "echo", vec![json!("text")])
        .await
        .unwrap_err();
    assert!(matches!(err, ArchivistError::ArgumentType { position: 0, .. }));
}

#[tokio::test]
async fn acl_outside_entry_method_is_fatal() {
    let mut registry = CommandRegistry::new(types());
    let err = registry
        .register(
            CommandDescriptor::new("renamePlayer")
                .param("player", "Player")
                .annotate("helper", &["admin"]),
            |_ctx: ExecutionContext, _args: CastArgs| async move { Ok::<Value, ArchivistError>(Value::Null) },
        )
        .unwrap_err();

    assert!(matches!(
        err,
        ArchivistError::AclOnNonEntryMethod { ref method, .. } if method == "helper"
    ));
    assert_eq!(err.class(), ErrorClass::Configuration);
    assert!(registry.get("renamePlayer").is_none());
}

#[tokio::test]
async fn unknown_parameter_type_is_fatal() {
    let mut registry = CommandRegistry::new(types());
    let err = registry
        .register(
            CommandDescriptor::new("join").param("guild", "Guild"),
            |_ctx: ExecutionContext, _args: CastArgs| async move { Ok::<Value, ArchivistError>(Value::Null) },
        )
        .unwrap_err();

    assert!(matches!(
        err,
        ArchivistError::UnknownParameterType { ref type_name, .. } if type_name == "Guild"
    ));
}

#[tokio::test]
async fn registry_lookup_and_acl() {
    let registry = counting_registry(Arc::new(AtomicUsize::new(0)));

    assert_eq!(registry.acl("renamePlayer"), Some(vec!["user".to_string()]));
    assert_eq!(registry.acl("missing"), None);
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["renamePlayer"]);
    assert!(registry.types().is_entity("Player"));

    let err = registry
        .execute(&context(), "missing", Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ArchivistError::UnknownCommand(name) if name == "missing"));
}

#[tokio::test]
async fn duplicate_command_is_fatal() {
    let mut registry = counting_registry(Arc::new(AtomicUsize::new(0)));
    let err = registry
        .register(
            rename_descriptor(),
            |_ctx: ExecutionContext, _args: CastArgs| async move { Ok::<Value, ArchivistError>(Value::Null) },
        )
        .unwrap_err();

    assert!(matches!(err, ArchivistError::CommandAlreadyRegistered(name) if name == "renamePlayer"));
}
