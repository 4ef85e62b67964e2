use crate::path::EntityPath;
use crate::projection::{EntityProjection, IntoProjection, IntoTuple, Projections, TupleProjection};
use crate::query::Query;
use crate::session::Session;

/// Entry point for typed queries; borrows the session and owns nothing.
#[derive(Clone, Copy)]
pub struct QueryFactory<'s> {
    session: &'s Session,
}

impl<'s> QueryFactory<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &'s Session {
        self.session
    }

    /// `select(&member.username)`, `select(&member)` or a prepared projection.
    pub fn select<I: IntoProjection>(&self, item: I) -> Query<'s, I::Projection> {
        Query::new(self.session, item.into_projection())
    }

    /// Selects whole entities of `path` from `path`.
    pub fn select_from<P: EntityPath>(&self, path: &P) -> Query<'s, EntityProjection<P>> {
        Query::new(self.session, EntityProjection::new(path.clone())).from(path)
    }

    pub fn select_tuple(&self, items: impl IntoTuple) -> Query<'s, TupleProjection> {
        Query::new(self.session, Projections::tuple(items))
    }
}
