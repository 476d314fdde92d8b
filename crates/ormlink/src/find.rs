//! Lazy query chains.

use ormlink_core::{Cx, Error, Outcome, ValidationErrorKind, try_ok, try_outcome};
use ormlink_query::{Direction, Operation, OrderBy};

use crate::conditions::{Conditions, resolve};
use crate::facade::promise_and_callback;
use crate::instance::Instance;
use crate::model::Model;

/// A query over one model that runs only when asked to.
///
/// Nothing reaches the driver until [`run`](Self::run), [`first`](Self::first),
/// [`last`](Self::last), [`count`](Self::count) or [`remove`](Self::remove)
/// is awaited. Each of those re-queries storage.
///
/// # Example
///
/// ```rust,ignore
/// let owners = person
///     .find(Conditions::new().related("pet", &deco))
///     .order("-name")
///     .limit(10)
///     .run(&cx)
///     .await;
/// ```
#[derive(Debug, Clone)]
pub struct ChainFind {
    model: Model,
    conditions: Conditions,
    order: Vec<OrderBy>,
    limit: Option<usize>,
    offset: Option<usize>,
    only: Option<Vec<String>>,
}

impl ChainFind {
    pub(crate) fn new(model: Model, conditions: Conditions) -> Self {
        Self {
            model,
            conditions,
            order: Vec::new(),
            limit: None,
            offset: None,
            only: None,
        }
    }

    /// Add more conditions.
    #[must_use]
    pub fn filter(mut self, conditions: Conditions) -> Self {
        self.conditions = self.conditions.merge(conditions);
        self
    }

    /// Order by `term`; a leading `-` sorts descending.
    #[must_use]
    pub fn order(mut self, term: &str) -> Self {
        self.order.push(OrderBy::parse(term));
        self
    }

    /// Order by `column` descending.
    #[must_use]
    pub fn order_desc(mut self, column: &str) -> Self {
        self.order.push(OrderBy::desc(column));
        self
    }

    /// Return at most `n` instances.
    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Skip the first `n` instances.
    #[must_use]
    pub fn offset(mut self, n: usize) -> Self {
        self.offset = Some(n);
        self
    }

    /// Load only these properties (key properties are always loaded).
    #[must_use]
    pub fn only<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.only = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    fn check_columns(&self) -> Result<Option<Vec<String>>, Error> {
        let named = self
            .order
            .iter()
            .map(|o| &o.column)
            .chain(self.only.iter().flatten());
        for column in named {
            if !self.model.has_property(column) {
                return Err(Error::validation(
                    column,
                    ValidationErrorKind::UnknownProperty,
                    format!("{} has no property {column}", self.model.name()),
                ));
            }
        }
        Ok(self.only.as_ref().map(|only| {
            let mut columns: Vec<String> = self.model.key().to_vec();
            for column in only {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
            columns
        }))
    }

    /// Run the query.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.model.name()))]
    pub async fn run(&self, cx: &Cx) -> Outcome<Vec<Instance>, Error> {
        let columns = try_ok!(self.check_columns());
        let resolved = try_outcome!(resolve(&self.model, cx, &self.conditions, true).await);
        let select = resolved
            .into_select(self.model.table())
            .order(self.order.clone())
            .limit(self.limit)
            .offset(self.offset)
            .columns(columns);
        self.model.select(cx, select).await
    }

    /// First matching instance.
    pub async fn first(&self, cx: &Cx) -> Outcome<Option<Instance>, Error> {
        let found = try_outcome!(self.clone().limit(1).run(cx).await);
        Outcome::Ok(found.into_iter().next())
    }

    /// Last matching instance in the chain's order.
    ///
    /// With explicit ordering this flips the order and takes one row;
    /// otherwise it reads every match and keeps the last.
    pub async fn last(&self, cx: &Cx) -> Outcome<Option<Instance>, Error> {
        if self.order.is_empty() || self.offset.is_some() || self.limit.is_some() {
            let found = try_outcome!(self.run(cx).await);
            return Outcome::Ok(found.into_iter().last());
        }
        let mut flipped = self.clone();
        for term in &mut flipped.order {
            term.direction = match term.direction {
                Direction::Asc => Direction::Desc,
                Direction::Desc => Direction::Asc,
            };
        }
        flipped.first(cx).await
    }

    /// Number of matching instances; ignores order, limit and offset.
    pub async fn count(&self, cx: &Cx) -> Outcome<u64, Error> {
        try_ok!(self.check_columns());
        let resolved = try_outcome!(resolve(&self.model, cx, &self.conditions, true).await);
        self.model
            .ctx()
            .count(cx, resolved.into_select(self.model.table()))
            .await
    }

    /// Delete every matching row; returns the number removed. Hooks do not
    /// run for rows deleted this way.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.model.name()))]
    pub async fn remove(&self, cx: &Cx) -> Outcome<u64, Error> {
        let resolved = try_outcome!(resolve(&self.model, cx, &self.conditions, false).await);
        let n = try_outcome!(
            self.model
                .ctx()
                .affected(cx, Operation::delete(self.model.table(), resolved.filter))
                .await
        );
        tracing::info!(model = self.model.name(), rows = n, "Removed matching rows");
        Outcome::Ok(n)
    }

    promise_and_callback! {
        run => run_async, run_cb () -> Vec<Instance>;
        first => first_async, first_cb () -> Option<Instance>;
        last => last_async, last_cb () -> Option<Instance>;
        count => count_async, count_cb () -> u64;
        remove => remove_async, remove_cb () -> u64;
    }
}
