use std::{collections::HashSet, sync::Arc};

use crate::{
    errors::{ReferenceErrors, UnresolvedReference},
    metadata::Dependency,
    recipe::RecipeId,
    repository::Repository,
    satisfiable::SatisfiableRecipe,
};

/// Walks the recipes of a repository
///
/// All walks are iterative and keep a visited set, so a recipe reachable through several
/// paths is handled once and cyclic definitions terminate.
pub struct DependencyGraph<'a> {
    repository: &'a Repository,
}
impl<'a> DependencyGraph<'a> {
    pub fn new(repository: &'a Repository) -> Self {
        Self { repository }
    }

    /// Every recipe reachable from the roots, roots included, in discovery order
    pub fn reachable(&self, roots: impl IntoIterator<Item = RecipeId>) -> Vec<RecipeId> {
        let mut visited = HashSet::new();
        let mut found = Vec::new();
        let mut stack: Vec<RecipeId> = Vec::new();

        for root in roots {
            if visited.insert(root) {
                stack.push(root);
            }
            while let Some(id) = stack.pop() {
                found.push(id);
                let Some(recipe) = self.repository.get(id) else {
                    continue;
                };
                for dependency in recipe.nested() {
                    let Dependency::Ref(target) = dependency else {
                        continue;
                    };
                    if let Some(next) = self.repository.recipe_id(&target) {
                        if visited.insert(next) {
                            stack.push(next);
                        }
                    }
                }
            }
        }

        found
    }

    /// Validate that every `Ref` and `IdRef` points at an existing component
    ///
    /// Returns a list of all issues
    pub fn check(&self) -> Result<(), ReferenceErrors> {
        let mut errors = Vec::new();
        for id in self.reachable(self.repository.ids()) {
            let Some(recipe) = self.repository.get(id) else {
                continue;
            };
            for dependency in recipe.nested() {
                if !self.repository.contains(dependency.target()) {
                    errors.push(UnresolvedReference {
                        reference: dependency.target().to_string(),
                        required_by: recipe.name().to_string(),
                    });
                }
            }
        }

        if !errors.is_empty() {
            return Err(ReferenceErrors { errors });
        }

        Ok(())
    }

    /// Satisfiable recipes beneath a component, the component itself included
    pub fn satisfiables_under(&self, name: &str) -> Vec<Arc<dyn SatisfiableRecipe>> {
        let Some(root) = self.repository.recipe_id(name) else {
            return Vec::new();
        };
        self.reachable([root])
            .into_iter()
            .filter_map(|id| self.repository.get(id))
            .filter_map(|recipe| recipe.as_satisfiable().cloned())
            .collect()
    }

    /// Orders the given names so dependencies come before their dependents
    ///
    /// Unknown names are kept so creating them reports the error.
    pub fn dependency_order(&self, names: &[String]) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();

        for name in names {
            let Some(root) = self.repository.recipe_id(name) else {
                order.push(name.clone());
                continue;
            };
            if !visited.insert(root) {
                continue;
            }

            // (recipe, dependencies already pushed)
            let mut stack = vec![(root, false)];
            while let Some((id, expanded)) = stack.pop() {
                let Some(recipe) = self.repository.get(id) else {
                    continue;
                };
                if expanded {
                    order.push(recipe.name().to_string());
                    continue;
                }
                stack.push((id, true));
                for dependency in recipe.nested().iter().rev() {
                    let Dependency::Ref(target) = dependency else {
                        continue;
                    };
                    if let Some(next) = self.repository.recipe_id(target) {
                        if visited.insert(next) {
                            stack.push((next, false));
                        }
                    }
                }
            }
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use crate::{factories::factory_fn, metadata::BeanMetadata, recipe::Recipe};

    fn bean(id: &str, refs: &[&str]) -> Recipe {
        let mut bean = BeanMetadata::new(id, factory_fn(|_| Ok::<_, Infallible>(())));
        for target in refs {
            bean = bean.arg_ref(*target);
        }
        Recipe::Bean(bean)
    }

    fn diamond() -> Repository {
        let mut repository = Repository::new();
        repository.put_recipe(bean("top", &["left", "right"]));
        repository.put_recipe(bean("left", &["bottom"]));
        repository.put_recipe(bean("right", &["bottom"]));
        repository.put_recipe(bean("bottom", &[]));
        repository
    }

    #[test]
    fn diamond_is_visited_once() {
        let repository = diamond();
        let graph = DependencyGraph::new(&repository);
        let root = repository.recipe_id("top").unwrap();

        let reachable = graph.reachable([root]);
        assert_eq!(reachable.len(), 4);
        assert!(graph.check().is_ok());

        let order = graph.dependency_order(&["top".to_string()]);
        assert_eq!(order.len(), 4);
        assert_eq!(order.last().unwrap(), "top");
        let position = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(position("bottom") < position("left"));
        assert!(position("bottom") < position("right"));
    }

    #[test]
    fn cycles_terminate() {
        let mut repository = Repository::new();
        repository.put_recipe(bean("a", &["b"]));
        repository.put_recipe(bean("b", &["a"]));
        let graph = DependencyGraph::new(&repository);

        assert_eq!(graph.reachable(repository.ids()).len(), 2);
        assert!(graph.check().is_ok());
        assert_eq!(graph.dependency_order(&["a".to_string()]), vec!["b", "a"]);
    }

    #[test]
    fn check_reports_every_missing_reference() {
        let mut repository = Repository::new();
        repository.put_recipe(bean("a", &["missing"]));
        repository.put_recipe(Recipe::Bean(
            BeanMetadata::new("b", factory_fn(|_| Ok::<_, Infallible>(()))).arg_id_ref("gone"),
        ));

        let errors = DependencyGraph::new(&repository).check().unwrap_err();
        assert_eq!(errors.errors.len(), 2);
        assert!(errors.to_string().contains("'a' references 'missing'"));
        assert!(errors.to_string().contains("'b' references 'gone'"));
    }
}
