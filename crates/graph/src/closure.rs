use crate::error::{GraphError, Result};
use protokit_module::{Module, ModuleProvider, ModuleRef};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Every module reachable from `modules` through declared dependencies.
///
/// Dependencies satisfied by a module in `modules` (same full name) are not
/// fetched. Everything else is fetched through `provider`, one dependency
/// level at a time with the fetches of a level running concurrently. The
/// result is `modules` followed by the fetched modules sorted by full name,
/// independent of fetch completion order.
pub async fn resolve_dependency_closure(
    provider: Arc<ModuleProvider>,
    modules: &[Module],
) -> Result<Vec<Module>> {
    let local_names: HashSet<String> = modules
        .iter()
        .filter_map(|m| m.full_name().map(ToString::to_string))
        .collect();
    let mut fetched: BTreeMap<String, Module> = BTreeMap::new();
    let mut requested: HashSet<ModuleRef> = HashSet::new();
    let mut frontier: Vec<ModuleRef> = modules
        .iter()
        .flat_map(|m| m.declared_deps().iter().cloned())
        .collect();

    while !frontier.is_empty() {
        let mut tasks = JoinSet::new();
        for module_ref in frontier.drain(..) {
            if local_names.contains(&module_ref.full_name().to_string())
                || !requested.insert(module_ref.clone())
            {
                continue;
            }
            let provider = Arc::clone(&provider);
            tasks.spawn(async move { provider.get_module(&module_ref).await });
        }

        let mut level = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            level.push(joined??);
        }
        level.sort_by(|a, b| (a.opaque_id(), a.commit()).cmp(&(b.opaque_id(), b.commit())));

        for module in level {
            let name = module.opaque_id().to_string();
            let commit = module.commit().unwrap_or_default().to_string();
            if let Some(existing) = fetched.get(&name) {
                let first = existing.commit().unwrap_or_default();
                if first != commit {
                    return Err(GraphError::DivergentCommits {
                        name,
                        first: first.to_string(),
                        second: commit,
                    });
                }
                continue;
            }
            log::debug!("fetched dependency {name}:{commit}");
            frontier.extend(module.declared_deps().iter().cloned());
            fetched.insert(name, module);
        }
    }

    let mut closure = modules.to_vec();
    closure.extend(fetched.into_values());
    Ok(closure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use protokit_module::NoRegistry;
    use protokit_storage::MemoryBucket;

    #[tokio::test]
    async fn workspace_modules_satisfy_declared_deps() {
        let money = Module::local("money", Arc::new(MemoryBucket::new()))
            .with_full_name(Some("buf.build/acme/money".parse().unwrap()));
        let pet = Module::local("pet", Arc::new(MemoryBucket::new()))
            .with_declared_deps(vec!["buf.build/acme/money".parse().unwrap()]);
        let provider = Arc::new(ModuleProvider::new(Arc::new(NoRegistry), Arc::new(NoRegistry)));
        let closure = resolve_dependency_closure(provider, &[pet, money]).await.unwrap();
        let ids: Vec<&str> = closure.iter().map(Module::opaque_id).collect();
        assert_eq!(ids, vec!["pet", "money"]);
    }

    #[tokio::test]
    async fn missing_remote_deps_are_errors() {
        let pet = Module::local("pet", Arc::new(MemoryBucket::new()))
            .with_declared_deps(vec!["buf.build/acme/gone".parse().unwrap()]);
        let provider = Arc::new(ModuleProvider::new(Arc::new(NoRegistry), Arc::new(NoRegistry)));
        let err = resolve_dependency_closure(provider, &[pet]).await.unwrap_err();
        assert!(matches!(err, GraphError::Module(ref e) if e.is_not_found()), "{err}");
    }
}
