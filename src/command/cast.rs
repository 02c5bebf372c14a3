use crate::context::ExecutionContext;
use crate::core::{ArchivistError, Result};
use crate::crash::crash;
use crate::entity::{Entity, Topic, TopicDescriptor, TopicRegistry};
use crate::persistence::{RawIndex, raw_index};
use crate::transform::{is_truthy, to_instance, to_plain};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// One casted argument: the typed instance and its plain view.
///
/// The view is what aggregate validation sees; the instance is what the
/// command body receives.
pub struct CastValue {
    view: Value,
    instance: Option<Box<dyn Any + Send>>,
}

impl CastValue {
    pub fn of<T: Any + Send>(view: Value, instance: T) -> Self {
        Self {
            view,
            instance: Some(Box::new(instance)),
        }
    }

    /// An argument that was not provided (or was falsy for an entity parameter).
    pub fn absent(view: Value) -> Self {
        Self {
            view,
            instance: None,
        }
    }

    pub fn view(&self) -> &Value {
        &self.view
    }

    pub fn is_absent(&self) -> bool {
        self.instance.is_none()
    }
}

impl fmt::Debug for CastValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CastValue")
            .field("view", &self.view)
            .field("absent", &self.is_absent())
            .finish()
    }
}

/// Casted arguments in declared parameter order (the context is not included).
#[derive(Debug, Default)]
pub struct CastArgs {
    values: Vec<CastValue>,
}

impl CastArgs {
    pub fn new(values: Vec<CastValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Plain view of the argument at `position`.
    pub fn view(&self, position: usize) -> Option<&Value> {
        self.values.get(position).map(CastValue::view)
    }

    /// Takes the typed instance at `position` out of the list.
    pub fn take<T: Any>(&mut self, position: usize) -> Result<T> {
        self.take_optional(position)?
            .ok_or(ArchivistError::ArgumentType {
                position,
                expected: type_name::<T>(),
            })
    }

    /// Like `take`, but an absent argument yields `None`.
    pub fn take_optional<T: Any>(&mut self, position: usize) -> Result<Option<T>> {
        let mismatch = || ArchivistError::ArgumentType {
            position,
            expected: type_name::<T>(),
        };

        let slot = self.values.get_mut(position).ok_or_else(mismatch)?;
        let Some(instance) = slot.instance.take() else {
            return Ok(None);
        };

        match instance.downcast::<T>() {
            Ok(typed) => Ok(Some(*typed)),
            Err(instance) => {
                slot.instance = Some(instance);
                Err(mismatch())
            }
        }
    }
}

type PlainCast = dyn Fn(Value) -> Result<CastValue> + Send + Sync;

/// Builds a persistence-backed instance from an index and its data.
#[async_trait]
pub trait EntityHydrator: Send + Sync {
    fn topic(&self) -> &str;

    async fn hydrate(&self, ctx: &ExecutionContext, index: RawIndex, data: Value) -> Result<CastValue>;
}

struct TopicHydrator<T>(PhantomData<fn() -> T>);

#[async_trait]
impl<T: Topic> EntityHydrator for TopicHydrator<T> {
    fn topic(&self) -> &str {
        T::NAME
    }

    async fn hydrate(&self, ctx: &ExecutionContext, index: RawIndex, data: Value) -> Result<CastValue> {
        let entity = Entity::<T>::create(ctx, index, Some(data)).await?;
        Ok(CastValue::of(entity.view()?, entity))
    }
}

/// How a declared parameter type is cast.
#[derive(Clone)]
pub enum DeclaredType {
    /// Transformed from the plain value; never touches persistence.
    Plain(Arc<PlainCast>),
    /// Persistence-backed entity kind, hydrated from `{ index, ...data }`.
    Entity(Arc<dyn EntityHydrator>),
}

impl DeclaredType {
    pub fn plain<T>() -> Self
    where
        T: DeserializeOwned + Serialize + Send + 'static,
    {
        Self::Plain(Arc::new(|raw| {
            let instance: T = to_instance(raw)?;
            Ok(CastValue::of(to_plain(&instance)?, instance))
        }))
    }

    pub fn entity<T: Topic>() -> Self {
        Self::Entity(Arc::new(TopicHydrator::<T>(PhantomData)))
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, Self::Entity(_))
    }

    /// Casts one raw argument.
    ///
    /// Entity types hydrate only for truthy values: the `index` field is split
    /// off (an empty index when missing) and the remaining fields become the
    /// entity data. Everything else goes through plain transformation.
    pub async fn cast(&self, ctx: &ExecutionContext, raw: Value) -> Result<CastValue> {
        match self {
            Self::Entity(hydrator) if is_truthy(&raw) => {
                let (index, data) = split_index(raw)?;
                hydrator.hydrate(ctx, index, data).await
            }
            Self::Entity(_) => Ok(CastValue::absent(raw)),
            Self::Plain(cast) => cast(raw),
        }
    }
}

impl fmt::Debug for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Plain"),
            Self::Entity(hydrator) => write!(f, "Entity({})", hydrator.topic()),
        }
    }
}

fn split_index(raw: Value) -> Result<(RawIndex, Value)> {
    match raw {
        Value::Object(mut fields) => {
            let index = match fields.remove("index") {
                Some(index) => raw_index(index)?,
                None => RawIndex::new(),
            };
            Ok((index, Value::Object(fields)))
        }
        other => Ok((RawIndex::new(), other)),
    }
}

/// Declared parameter types by name, built once at startup.
///
/// Commands resolve their parameter types here when they are registered, so
/// an unknown type is a startup failure rather than a per-call one.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, DeclaredType>,
    topics: TopicRegistry,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `string`, `integer`, `number`, `boolean`, `object` and `any`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.types.insert("string".to_string(), DeclaredType::plain::<String>());
        registry.types.insert("integer".to_string(), DeclaredType::plain::<i64>());
        registry.types.insert("number".to_string(), DeclaredType::plain::<f64>());
        registry.types.insert("boolean".to_string(), DeclaredType::plain::<bool>());
        registry
            .types
            .insert("object".to_string(), DeclaredType::plain::<Map<String, Value>>());
        registry.types.insert("any".to_string(), DeclaredType::plain::<Value>());
        registry
    }

    /// Registers a declared type under `name`.
    pub fn register(&mut self, name: impl Into<String>, declared: DeclaredType) -> Result<()> {
        let name = name.into();
        self.ensure_free(&name)?;
        self.types.insert(name, declared);
        Ok(())
    }

    fn ensure_free(&self, name: &str) -> Result<()> {
        if self.types.contains_key(name) {
            return Err(crash(
                ArchivistError::Config(format!("type '{}' is already registered", name)),
                json!({ "type": name }),
            ));
        }
        Ok(())
    }

    pub fn register_plain<T>(&mut self, name: impl Into<String>) -> Result<()>
    where
        T: DeserializeOwned + Serialize + Send + 'static,
    {
        self.register(name, DeclaredType::plain::<T>())
    }

    /// Registers an entity kind under its topic name, together with its topic descriptor.
    ///
    /// Nothing is registered when either name is already taken.
    pub fn register_entity<T: Topic>(&mut self) -> Result<()> {
        self.ensure_free(T::NAME)?;
        self.topics.register(TopicDescriptor::of::<T>())?;
        self.types.insert(T::NAME.to_string(), DeclaredType::entity::<T>());
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<&DeclaredType> {
        self.types.get(name)
    }

    pub fn is_entity(&self, name: &str) -> bool {
        self.resolve(name).is_some_and(DeclaredType::is_entity)
    }

    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.types.iter()).finish()
    }
}
