use std::sync::Arc;

use common::funnel::EventRef;
use common::funnel::PropValueFilter;

use crate::error::Result;
use crate::funnel::matcher::EventPredicate;
use crate::funnel::matcher::PredicateRef;

pub mod funnel;

pub fn event_predicate(event: &EventRef, filters: &Option<Vec<PropValueFilter>>) -> Result<PredicateRef> {
    let pred = EventPredicate::try_new(event.clone(), filters.as_deref())?;

    Ok(Arc::new(pred))
}
