use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use crate::{
    dependency_graph::DependencyGraph,
    repository::Repository,
    types::{DynError, Instance, TypeInfo},
};

/// Receives satisfaction changes of tracked recipes
///
/// Calls are not serialized and may arrive on any thread,
/// including the one currently driving the module.
pub trait SatisfactionListener: Send + Sync {
    fn notify_satisfaction(&self, recipe: &str, satisfied: bool);
}

/// A recipe whose readiness depends on something outside of the module
pub trait SatisfiableRecipe: Send + Sync {
    fn name(&self) -> &str;

    /// Starts observing, changes are reported to `listener` until [`stop`](Self::stop)
    fn start(&self, listener: Arc<dyn SatisfactionListener>);

    fn stop(&self);

    fn is_satisfied(&self) -> bool;

    /// What is missing while unsatisfied
    fn requirement(&self) -> String;

    fn provides(&self) -> TypeInfo;

    fn create(&self) -> Result<Instance, DynError>;
}

/// Satisfiable recipes of one repository generation, by the component they sit beneath
///
/// The snapshot is computed once in [`discover`](Self::discover) and dropped with the generation.
#[derive(Default)]
pub struct SatisfiableDependencyTracker {
    dependencies: BTreeMap<String, Vec<Arc<dyn SatisfiableRecipe>>>,
    started: bool,
}
impl SatisfiableDependencyTracker {
    pub fn discover(repository: &Repository) -> Self {
        let graph = DependencyGraph::new(repository);
        let dependencies = repository
            .names()
            .map(|name| (name.to_string(), graph.satisfiables_under(name)))
            .filter(|(_, recipes)| !recipes.is_empty())
            .collect();
        Self {
            dependencies,
            started: false,
        }
    }

    /// Each recipe once, even if several components depend on it
    fn unique(&self) -> Vec<&Arc<dyn SatisfiableRecipe>> {
        let mut seen = BTreeSet::new();
        self.dependencies
            .values()
            .flatten()
            .filter(|recipe| seen.insert(recipe.name().to_string()))
            .collect()
    }

    pub fn start(&mut self, listener: Arc<dyn SatisfactionListener>) {
        if self.started {
            return;
        }
        self.started = true;
        let recipes = self.unique();
        tracing::debug!(
            recipes = ?recipes.iter().map(|r| r.name()).collect::<Vec<_>>(),
            "Tracking satisfiable dependencies"
        );
        for recipe in recipes {
            recipe.start(listener.clone());
        }
    }

    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;
        for recipe in self.unique() {
            recipe.stop();
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_all_satisfied(&self) -> bool {
        self.dependencies.values().flatten().all(|recipe| recipe.is_satisfied())
    }

    /// Requirements of every unsatisfied recipe
    pub fn missing(&self) -> Vec<String> {
        self.unique()
            .into_iter()
            .filter(|recipe| !recipe.is_satisfied())
            .map(|recipe| recipe.requirement())
            .collect()
    }

    pub fn components_depending_on(&self, recipe: &str) -> Vec<&str> {
        self.dependencies
            .iter()
            .filter(|(_, recipes)| recipes.iter().any(|r| r.name() == recipe))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn dependencies(&self) -> &BTreeMap<String, Vec<Arc<dyn SatisfiableRecipe>>> {
        &self.dependencies
    }
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use super::*;
    use crate::{factories::factory_fn, metadata::BeanMetadata, recipe::Recipe};

    #[derive(Default)]
    struct Counting {
        name: String,
        satisfied: AtomicBool,
        starts: AtomicUsize,
        stops: AtomicUsize,
    }
    impl SatisfiableRecipe for Counting {
        fn name(&self) -> &str {
            &self.name
        }
        fn start(&self, _listener: Arc<dyn SatisfactionListener>) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
        fn is_satisfied(&self) -> bool {
            self.satisfied.load(Ordering::SeqCst)
        }
        fn requirement(&self) -> String {
            format!("{}.capability", self.name)
        }
        fn provides(&self) -> TypeInfo {
            TypeInfo::of::<()>()
        }
        fn create(&self) -> Result<Instance, DynError> {
            Ok(Instance::new(()))
        }
    }

    struct Ignore;
    impl SatisfactionListener for Ignore {
        fn notify_satisfaction(&self, _recipe: &str, _satisfied: bool) {}
    }

    #[test]
    fn shared_recipe_is_started_and_stopped_once() {
        let reference = Arc::new(Counting {
            name: "r".to_string(),
            ..Default::default()
        });
        let mut repository = Repository::new();
        repository.put_recipe(Recipe::Satisfiable(reference.clone()));
        for id in ["left", "right"] {
            repository.put_recipe(Recipe::Bean(
                BeanMetadata::new(id, factory_fn(|_| Ok::<_, Infallible>(()))).arg_ref("r"),
            ));
        }
        repository.put_recipe(Recipe::Bean(
            BeanMetadata::new("top", factory_fn(|_| Ok::<_, Infallible>(())))
                .arg_ref("left")
                .arg_ref("right"),
        ));

        let mut tracker = SatisfiableDependencyTracker::discover(&repository);
        assert_eq!(tracker.dependencies().len(), 4);
        assert_eq!(tracker.components_depending_on("r"), vec!["left", "r", "right", "top"]);

        tracker.start(Arc::new(Ignore));
        tracker.start(Arc::new(Ignore));
        assert_eq!(reference.starts.load(Ordering::SeqCst), 1);
        assert!(!tracker.is_all_satisfied());
        assert_eq!(tracker.missing(), vec!["r.capability"]);

        reference.satisfied.store(true, Ordering::SeqCst);
        assert!(tracker.is_all_satisfied());
        assert!(tracker.missing().is_empty());

        tracker.stop();
        tracker.stop();
        assert_eq!(reference.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn graph_without_satisfiables_is_satisfied() {
        let mut repository = Repository::new();
        repository.put_recipe(Recipe::Bean(BeanMetadata::new(
            "a",
            factory_fn(|_| Ok::<_, Infallible>(())),
        )));
        let tracker = SatisfiableDependencyTracker::discover(&repository);
        assert!(tracker.dependencies().is_empty());
        assert!(tracker.is_all_satisfied());
    }
}
