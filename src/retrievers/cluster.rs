//! Cluster-wide summary. Always the first type of a cycle: its version
//! string drives capability detection for everything after it.

use super::{Retriever, Rows};
use crate::{
    error::RetrieveError,
    model::StatsModel,
    transport::{EntityQuery, RequestSender},
    types::{EntityKey, Record, Schema},
};
use async_trait::async_trait;

pub static SCHEMA: Schema = Schema {
    name: "cluster",
    columns: &[
        "clusterName",
        "version",
        "clusterSize",
        "licenseMode",
        "membersDeparted",
    ],
};

pub const COL_CLUSTER_NAME: usize = 0;
pub const COL_VERSION: usize = 1;
pub const COL_CLUSTER_SIZE: usize = 2;
pub const COL_LICENSE_MODE: usize = 3;
pub const COL_MEMBERS_DEPARTED: usize = 4;

pub struct ClusterRetriever;

#[async_trait]
impl Retriever for ClusterRetriever {
    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("clusters"),
                &[
                    "clusterName",
                    "version",
                    "clusterSize",
                    "licenseMode",
                    "membersDepartureCount",
                ],
            )
            .await?;

        let mut rows = Rows::new();
        for item in items {
            let name = item
                .str_("clusterName")
                .ok_or_else(|| RetrieveError::Malformed("cluster entry without clusterName".into()))?
                .to_owned();
            let mut record = Record::new(&SCHEMA);
            record.set(COL_CLUSTER_NAME, name.clone());
            record.set(COL_VERSION, item.str_("version").unwrap_or_default());
            record.set(COL_CLUSTER_SIZE, item.i64_("clusterSize").unwrap_or_default());
            record.set(COL_LICENSE_MODE, item.str_("licenseMode").unwrap_or_default());
            record.set(
                COL_MEMBERS_DEPARTED,
                item.i64_("membersDepartureCount").unwrap_or_default(),
            );
            rows.push((EntityKey::Name(name), record));
        }
        Ok(Some(rows))
    }
}
