use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use ahash::AHashMap;
use itertools::Itertools;
use log::debug;
use sqlseed_lib_core::errors::{GenerateError, Result};
use sqlseed_lib_core::generator::EntitySqlGenerator;
use sqlseed_lib_core::helpers::IndexMap;

use crate::config::ImporterConfig;

/// A user-supplied component that builds a batch of entities and then emits
/// them through the generator. Build and write run as two separate passes
/// over all providers, each in execution order.
pub trait DataProvider {
    fn name(&self) -> &str;

    /// First pass: create the entity instances.
    fn build_entities(&mut self) -> Result<()>;

    /// Second pass: hand the instances to the generator.
    fn write_entities(&mut self, generator: &mut EntitySqlGenerator<'_>) -> Result<()>;
}

pub type ProviderHandle = Rc<RefCell<Box<dyn DataProvider>>>;

/// What a provider constructor may draw on: the data folder, the resolved
/// configuration, and every provider constructed before it.
pub struct ProviderResources<'a> {
    pub data_folder: Option<&'a Path>,
    pub config: &'a ImporterConfig,
    providers: &'a IndexMap<String, ProviderHandle>,
}

impl ProviderResources<'_> {
    pub fn provider(&self, name: &str) -> Option<ProviderHandle> {
        self.providers.get(name).map(Rc::clone)
    }
}

type Constructor = Box<dyn FnOnce(&ProviderResources<'_>) -> Result<Box<dyn DataProvider>>>;

/// Declares one provider: its name, ordering priority, package label,
/// dependencies, and the constructor invoked once those are satisfied.
pub struct ProviderFactory {
    name: String,
    package: String,
    order: isize,
    dependencies: Vec<String>,
    constructor: Constructor,
}

impl ProviderFactory {
    pub fn new(
        name: impl Into<String>,
        constructor: impl FnOnce(&ProviderResources<'_>) -> Result<Box<dyn DataProvider>> + 'static,
    ) -> Self {
        ProviderFactory {
            name: name.into(),
            package: String::new(),
            order: 0,
            dependencies: Vec::new(),
            constructor: Box::new(constructor),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(mut self, order: isize) -> Self {
        self.order = order;
        self
    }

    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn depends_on(mut self, provider: impl Into<String>) -> Self {
        self.dependencies.push(provider.into());
        self
    }
}

/// Instantiates providers in rounds and produces the execution list.
///
/// A factory is constructible once all of its dependencies exist. Its
/// effective order is the maximum of its declared order and its
/// dependencies' effective orders, so a dependency always runs first even
/// when the declared numbers contradict it. Insertion keeps the list sorted
/// by effective order, stable on ties. A round without progress means the
/// remaining constructors can never be satisfied.
pub(crate) fn instantiate_providers(
    factories: Vec<ProviderFactory>,
    data_folder: Option<&Path>,
    config: &ImporterConfig,
) -> Result<Vec<(String, ProviderHandle)>> {
    let mut remaining: Vec<ProviderFactory> = factories
        .into_iter()
        .filter(|factory| {
            config.provider_packages.is_empty()
                || config
                    .provider_packages
                    .iter()
                    .any(|root| factory.package.starts_with(root.as_str()))
        })
        .collect();

    let mut constructed: IndexMap<String, ProviderHandle> = IndexMap::default();
    let mut effective_orders: AHashMap<String, isize> = AHashMap::new();
    let mut execution: Vec<(String, isize, ProviderHandle)> = Vec::new();

    while !remaining.is_empty() {
        let mut progressed = false;
        let mut deferred = Vec::new();

        for factory in remaining.drain(..) {
            let satisfied = factory
                .dependencies
                .iter()
                .all(|dependency| constructed.contains_key(dependency));
            if !satisfied {
                deferred.push(factory);
                continue;
            }

            let provider = {
                let resources = ProviderResources {
                    data_folder,
                    config,
                    providers: &constructed,
                };
                (factory.constructor)(&resources)?
            };
            debug!("instantiated provider {}", factory.name);

            let effective_order = factory
                .dependencies
                .iter()
                .map(|dependency| effective_orders[dependency.as_str()])
                .fold(factory.order, isize::max);
            let handle: ProviderHandle = Rc::new(RefCell::new(provider));
            constructed.insert(factory.name.clone(), Rc::clone(&handle));
            effective_orders.insert(factory.name.clone(), effective_order);

            let position = execution
                .iter()
                .position(|(_, order, _)| *order > effective_order)
                .unwrap_or(execution.len());
            execution.insert(position, (factory.name, effective_order, handle));
            progressed = true;
        }

        remaining = deferred;
        if !remaining.is_empty() && !progressed {
            return Err(GenerateError::model(format!(
                "providers with unsatisfiable constructor dependencies: {}",
                remaining.iter().map(ProviderFactory::name).join(", ")
            )));
        }
    }

    Ok(execution
        .into_iter()
        .map(|(name, _, handle)| (name, handle))
        .collect())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use sqlseed_lib_core::errors::Result;
    use sqlseed_lib_core::generator::EntitySqlGenerator;

    use super::{DataProvider, ProviderFactory, instantiate_providers};
    use crate::config::ImporterConfig;

    struct Noop(String);

    impl DataProvider for Noop {
        fn name(&self) -> &str {
            &self.0
        }

        fn build_entities(&mut self) -> Result<()> {
            Ok(())
        }

        fn write_entities(&mut self, _generator: &mut EntitySqlGenerator<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn noop(name: &'static str) -> ProviderFactory {
        ProviderFactory::new(name, move |_| Ok(Box::new(Noop(name.to_owned()))))
    }

    fn names(factories: Vec<ProviderFactory>) -> Vec<String> {
        instantiate_providers(factories, None, &ImporterConfig::default())
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    #[test]
    fn execution_follows_declared_order() {
        let order = names(vec![
            noop("orders").order(20),
            noop("users").order(10),
            noop("stats").order(30),
        ]);
        assert_eq!(order, ["users", "orders", "stats"]);
    }

    #[test]
    fn equal_orders_keep_registration_order() {
        let order = names(vec![noop("a"), noop("b"), noop("c")]);
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn dependencies_win_over_declared_order() {
        // "first" claims the lowest order but depends on "second": the
        // dependency's priority carries over.
        let order = names(vec![
            noop("first").order(1).depends_on("second"),
            noop("second").order(50),
            noop("third").order(10),
        ]);
        assert_eq!(order, ["third", "second", "first"]);
    }

    #[test]
    fn unsatisfiable_dependencies_are_a_model_error() {
        let result = instantiate_providers(
            vec![
                noop("a").depends_on("b"),
                noop("b").depends_on("a"),
            ],
            None,
            &ImporterConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn package_roots_filter_providers() {
        let mut config = ImporterConfig::default();
        config.provider_packages = vec!["seed.users".to_owned()];
        let providers = instantiate_providers(
            vec![
                noop("users").package("seed.users"),
                noop("orders").package("seed.orders"),
            ],
            None,
            &config,
        )
        .unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].0, "users");
    }
}
