use std::collections::BTreeMap;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use crate::{
    errors::CreationError,
    recipe::{Recipe, RecipeId},
    types::{DynError, Instance},
};

/// Releases one created instance
pub(crate) type Destroyer = Box<dyn FnOnce() -> Result<(), DynError> + Send>;

/// Recipes and created instances of one graph generation
///
/// Recipes are fixed once the repository is shared. Instances are added lazily
/// and are only ever removed by [`Repository::destroy`] or when carried into the next generation.
pub struct Repository {
    recipes: Vec<Recipe>,
    names: BTreeMap<String, RecipeId>,
    /// Serializes creation, reentrant so nested dependencies can be created on the same thread
    creation: ReentrantMutex<()>,
    state: Mutex<RepositoryState>,
}

#[derive(Default)]
struct RepositoryState {
    instances: BTreeMap<String, Instance>,
    creation_order: Vec<String>,
    in_progress: Vec<String>,
    destroyers: BTreeMap<String, Destroyer>,
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository {
    pub fn new() -> Self {
        Repository {
            recipes: Vec::new(),
            names: BTreeMap::new(),
            creation: ReentrantMutex::new(()),
            state: Mutex::new(RepositoryState::default()),
        }
    }

    /// Adds a recipe, a recipe with the same name is replaced
    pub fn put_recipe(&mut self, recipe: Recipe) -> RecipeId {
        if let Some(id) = self.names.get(recipe.name()).copied() {
            self.recipes[id.0] = recipe;
            return id;
        }
        let id = RecipeId(self.recipes.len());
        self.names.insert(recipe.name().to_string(), id);
        self.recipes.push(recipe);
        id
    }

    pub fn recipe(&self, name: &str) -> Option<&Recipe> {
        self.recipe_id(name).and_then(|id| self.get(id))
    }

    pub fn recipe_id(&self, name: &str) -> Option<RecipeId> {
        self.names.get(name).copied()
    }

    pub fn get(&self, id: RecipeId) -> Option<&Recipe> {
        self.recipes.get(id.0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    pub fn ids(&self) -> impl Iterator<Item = RecipeId> + '_ {
        self.names.values().copied()
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// An already created instance
    pub fn instance(&self, name: &str) -> Option<Instance> {
        self.state.lock().instances.get(name).cloned()
    }

    /// Names of created instances, oldest first
    pub fn created(&self) -> Vec<String> {
        self.state.lock().creation_order.clone()
    }

    /// Stores a created instance, the first instance for a name wins
    pub(crate) fn put_instance(
        &self,
        name: &str,
        instance: Instance,
        destroyer: Option<Destroyer>,
    ) -> Instance {
        let mut state = self.state.lock();
        if let Some(existing) = state.instances.get(name) {
            return existing.clone();
        }
        state.instances.insert(name.to_string(), instance.clone());
        state.creation_order.push(name.to_string());
        if let Some(destroyer) = destroyer {
            state.destroyers.insert(name.to_string(), destroyer);
        }
        instance
    }

    pub(crate) fn creation_guard(&self) -> ReentrantMutexGuard<'_, ()> {
        self.creation.lock()
    }

    /// Marks a component as being created
    ///
    /// Fails if it already is, which means the component depends on itself.
    pub(crate) fn begin_creation(&self, name: &str) -> Result<(), CreationError> {
        let mut state = self.state.lock();
        if let Some(position) = state.in_progress.iter().position(|entry| entry == name) {
            let mut chain = state.in_progress[position..].to_vec();
            chain.push(name.to_string());
            return Err(CreationError::CircularReference { chain });
        }
        state.in_progress.push(name.to_string());
        Ok(())
    }

    pub(crate) fn end_creation(&self, name: &str) {
        let mut state = self.state.lock();
        if let Some(position) = state.in_progress.iter().rposition(|entry| entry == name) {
            state.in_progress.remove(position);
        }
    }

    /// Moves instances into `next` for every name `next` still has a recipe for
    ///
    /// The recipe of `next` is kept. Returns the names which were carried.
    pub(crate) fn carry_forward(&self, next: &Repository) -> Vec<String> {
        let mut carried = Vec::new();
        let mut moved = Vec::new();
        {
            let mut state = self.state.lock();
            let order = std::mem::take(&mut state.creation_order);
            for name in order {
                if !next.contains(&name) {
                    state.creation_order.push(name);
                    continue;
                }
                if let Some(instance) = state.instances.remove(&name) {
                    let destroyer = state.destroyers.remove(&name);
                    moved.push((name, instance, destroyer));
                }
            }
        }

        for (name, instance, destroyer) in moved {
            next.put_instance(&name, instance, destroyer);
            carried.push(name);
        }
        carried
    }

    /// Destroys all cached instances, newest first
    ///
    /// A failing destroyer is logged and does not stop the others.
    pub fn destroy(&self) {
        let (order, mut destroyers) = {
            let mut state = self.state.lock();
            state.instances.clear();
            (
                std::mem::take(&mut state.creation_order),
                std::mem::take(&mut state.destroyers),
            )
        };

        for name in order.iter().rev() {
            let Some(destroyer) = destroyers.remove(name) else {
                continue;
            };
            match destroyer() {
                Ok(()) => tracing::debug!(component = %name, "Destroyed component"),
                Err(error) => {
                    tracing::warn!(component = %name, %error, "Error destroying component")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{convert::Infallible, sync::Arc};

    use parking_lot::Mutex;

    use super::*;
    use crate::{factories::factory_fn, metadata::BeanMetadata};

    fn repository(names: &[&str]) -> Repository {
        let mut repository = Repository::new();
        for name in names {
            repository.put_recipe(Recipe::Bean(BeanMetadata::new(
                *name,
                factory_fn(|_| Ok::<_, Infallible>(())),
            )));
        }
        repository
    }

    fn recording(log: &Arc<Mutex<Vec<String>>>, name: &str, fail: bool) -> Destroyer {
        let log = log.clone();
        let name = name.to_string();
        Box::new(move || {
            log.lock().push(name.clone());
            if fail {
                return Err("refused".into());
            }
            Ok(())
        })
    }

    #[test]
    fn destroys_in_reverse_creation_order_despite_failures() {
        let repository = repository(&["a", "b", "c"]);
        let log = Arc::new(Mutex::new(Vec::new()));
        for (name, fail) in [("b", false), ("a", true), ("c", false)] {
            repository.put_instance(name, Instance::new(()), Some(recording(&log, name, fail)));
        }

        repository.destroy();

        assert_eq!(*log.lock(), vec!["c", "a", "b"]);
        assert!(repository.instance("a").is_none());
        assert!(repository.created().is_empty());
    }

    #[test]
    fn first_instance_wins() {
        let repository = repository(&["a"]);
        let first = repository.put_instance("a", Instance::new(1u8), None);
        let second = repository.put_instance("a", Instance::new(2u8), None);
        assert!(first.same(&second));
    }

    #[test]
    fn nested_creation_of_the_same_name_is_circular() {
        let repository = repository(&["a", "b"]);
        repository.begin_creation("a").unwrap();
        repository.begin_creation("b").unwrap();

        match repository.begin_creation("a") {
            Err(CreationError::CircularReference { chain }) => assert_eq!(chain, vec!["a", "b", "a"]),
            other => panic!("unexpected {other:?}"),
        }

        repository.end_creation("b");
        repository.end_creation("a");
        assert!(repository.begin_creation("a").is_ok());
    }

    #[test]
    fn carry_forward_keeps_only_live_names() {
        let old = repository(&["converter", "removed"]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let converter = old.put_instance(
            "converter",
            Instance::new(7u32),
            Some(recording(&log, "converter", false)),
        );
        old.put_instance("removed", Instance::new(()), Some(recording(&log, "removed", false)));

        let next = repository(&["converter", "added"]);
        assert_eq!(old.carry_forward(&next), vec!["converter"]);

        assert!(next.instance("converter").unwrap().same(&converter));
        assert!(old.instance("converter").is_none());

        old.destroy();
        assert_eq!(*log.lock(), vec!["removed"]);
        next.destroy();
        assert_eq!(*log.lock(), vec!["removed", "converter"]);
    }
}
