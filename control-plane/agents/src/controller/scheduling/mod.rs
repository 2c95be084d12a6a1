/// Pool items and the eligible pool builder.
pub mod pool;

use crate::{
    controller::{registry::Registry, scheduling::pool::EligiblePools},
    errors::SvcError,
};
use stor_port::types::v0::transport::{AutoSelectFilter, StorPoolKey};

use async_trait::async_trait;
use std::collections::HashSet;

/// Default container of context and a list of items which must be filtered
/// down and sorted.
#[derive(Clone)]
pub struct ResourceData<C, I> {
    context: C,
    list: Vec<I>,
}
impl<C, I> ResourceData<C, I> {
    /// Create a new `Self`.
    pub fn new(request: C, list: Vec<I>) -> Self {
        Self {
            context: request,
            list,
        }
    }
    /// The context the items are filtered under.
    pub fn context(&self) -> &C {
        &self.context
    }
}

/// A chainable filter/sort pipeline over a `ResourceData`.
pub trait ResourceFilter: Sized {
    /// The context type of the pipeline.
    type Request;
    /// The item type being filtered.
    type Item;

    /// The mutable data of the pipeline.
    fn data(&mut self) -> &mut ResourceData<Self::Request, Self::Item>;

    /// Retain items for which `filter` holds.
    fn filter<F: FnMut(&Self::Request, &Self::Item) -> bool>(mut self, mut filter: F) -> Self {
        let data = self.data();
        data.list.retain(|v| filter(&data.context, v));
        self
    }
    /// Retain items for which `filter` holds, with an extra parameter.
    fn filter_param<P, F>(mut self, param: &P, filter: F) -> Self
    where
        F: Fn(&P, &Self::Request, &Self::Item) -> bool,
    {
        let data = self.data();
        data.list.retain(|v| filter(param, &data.context, v));
        self
    }
    /// Sort the items.
    fn sort<F: FnMut(&Self::Item, &Self::Item) -> std::cmp::Ordering>(mut self, sort: F) -> Self {
        let data = self.data();
        data.list.sort_by(sort);
        self
    }
    /// Collect the surviving items.
    fn collect(self) -> Vec<Self::Item>;
}

/// Selects the storage pools to host a resource's replicas.
///
/// `None` means no combination of pools satisfies the filter; a returned set
/// holds exactly `replica_count` pools, each on a distinct node.
#[async_trait]
pub trait AutoPlacer: Send + Sync + std::fmt::Debug {
    /// Select pools for the given filter, requiring at least `size_hint`
    /// bytes of usable capacity per pool.
    async fn auto_place(
        &self,
        filter: &AutoSelectFilter,
        size_hint: u64,
    ) -> Result<Option<Vec<StorPoolKey>>, SvcError>;
}

/// The default placer: the eligible pool pipeline followed by a greedy pick
/// of the best pool per node.
#[derive(Clone, Debug)]
pub struct FilterPlacer {
    registry: Registry,
}

impl FilterPlacer {
    /// Return a new `Self` operating on the given registry.
    pub fn new(registry: &Registry) -> Self {
        Self {
            registry: registry.clone(),
        }
    }
}

#[async_trait]
impl AutoPlacer for FilterPlacer {
    async fn auto_place(
        &self,
        filter: &AutoSelectFilter,
        size_hint: u64,
    ) -> Result<Option<Vec<StorPoolKey>>, SvcError> {
        let replica_count = match filter.replica_count {
            Some(count) if count > 0 => count as usize,
            _ => return Err(SvcError::ReplicaCountRequired {}),
        };

        let pools = EligiblePools::builder_with_defaults(&self.registry, filter, size_hint)
            .await?
            .collect();

        let mut nodes_used = HashSet::new();
        let mut selection = Vec::with_capacity(replica_count);
        for item in pools {
            if selection.len() == replica_count {
                break;
            }
            if nodes_used.insert(item.key().node.clone()) {
                selection.push(item.key().clone());
            }
        }
        Ok(if selection.len() == replica_count {
            Some(selection)
        } else {
            None
        })
    }
}
