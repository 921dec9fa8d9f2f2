//! Federation traffic per participant: outbound (destination) and
//! inbound (origin) summaries aggregated across members, plus the
//! per-node details for the selected participant.

use super::{row_i64, row_str, Retriever, Rows};
use crate::{
    error::RetrieveError,
    model::StatsModel,
    transport::{EntityQuery, ReportRow, RequestSender},
    types::{EntityKey, Record, Schema},
};
use async_trait::async_trait;
use std::collections::BTreeMap;

pub static DESTINATION_SCHEMA: Schema = Schema {
    name: "federationDestination",
    columns: &["state", "totalBytesSent", "totalMsgSent", "currentBandwidth"],
};

pub const COL_STATE: usize = 0;
pub const COL_BYTES_SENT: usize = 1;
pub const COL_MSG_SENT: usize = 2;
pub const COL_BANDWIDTH: usize = 3;

#[derive(Default)]
struct DestinationAggregate {
    state: String,
    bytes: i64,
    messages: i64,
    bandwidth: f64,
}

pub struct FederationDestinationRetriever;

#[async_trait]
impl Retriever for FederationDestinationRetriever {
    fn schema(&self) -> &'static Schema {
        &DESTINATION_SCHEMA
    }

    fn from_report_row(&self, _model: &StatsModel, row: &ReportRow) -> Option<(EntityKey, Record)> {
        let service = row_str(row, "service");
        let participant = row_str(row, "name");
        if service.is_empty() || participant.is_empty() {
            return None;
        }
        let mut record = Record::new(&DESTINATION_SCHEMA);
        record.set(COL_STATE, row_str(row, "state"));
        record.set(COL_BYTES_SENT, row_i64(row, "totalBytesSent"));
        record.set(COL_MSG_SENT, row_i64(row, "totalMsgSent"));
        record.set(COL_BANDWIDTH, row_i64(row, "currentBandwidth") as f64);
        Some((EntityKey::ServiceParticipant(service, participant), record))
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("federation").with("subType", "destination"),
                &[
                    "service",
                    "name",
                    "nodeId",
                    "state",
                    "totalBytesSent",
                    "totalMsgSent",
                    "currentBandwidth",
                ],
            )
            .await?;

        // Each member reports its own share; participants aggregate by sum.
        let mut aggregates: BTreeMap<(String, String), DestinationAggregate> = BTreeMap::new();
        for item in items {
            let (Some(service), Some(participant)) = (item.str_("service"), item.str_("name"))
            else {
                continue;
            };
            let entry = aggregates
                .entry((service.to_owned(), participant.to_owned()))
                .or_default();
            if entry.state.is_empty() {
                entry.state = item.str_("state").unwrap_or_default().to_owned();
            }
            entry.bytes += item.i64_("totalBytesSent").unwrap_or_default();
            entry.messages += item.i64_("totalMsgSent").unwrap_or_default();
            entry.bandwidth += item.f64_("currentBandwidth").unwrap_or_default();
        }

        let rows = aggregates
            .into_iter()
            .map(|((service, participant), aggregate)| {
                let mut record = Record::new(&DESTINATION_SCHEMA);
                record.set(COL_STATE, aggregate.state);
                record.set(COL_BYTES_SENT, aggregate.bytes);
                record.set(COL_MSG_SENT, aggregate.messages);
                record.set(COL_BANDWIDTH, aggregate.bandwidth);
                (
                    EntityKey::ServiceParticipant(service, participant),
                    record,
                )
            })
            .collect();
        Ok(Some(rows))
    }
}

pub static ORIGIN_SCHEMA: Schema = Schema {
    name: "federationOrigin",
    columns: &["totalBytesReceived", "totalMsgReceived"],
};

pub const COL_BYTES_RECEIVED: usize = 0;
pub const COL_MSG_RECEIVED: usize = 1;

pub struct FederationOriginRetriever;

#[async_trait]
impl Retriever for FederationOriginRetriever {
    fn schema(&self) -> &'static Schema {
        &ORIGIN_SCHEMA
    }

    fn from_report_row(&self, _model: &StatsModel, row: &ReportRow) -> Option<(EntityKey, Record)> {
        let service = row_str(row, "service");
        let participant = row_str(row, "name");
        if service.is_empty() || participant.is_empty() {
            return None;
        }
        let mut record = Record::new(&ORIGIN_SCHEMA);
        record.set(COL_BYTES_RECEIVED, row_i64(row, "totalBytesReceived"));
        record.set(COL_MSG_RECEIVED, row_i64(row, "totalMsgReceived"));
        Some((EntityKey::ServiceParticipant(service, participant), record))
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("federation").with("subType", "origin"),
                &[
                    "service",
                    "name",
                    "nodeId",
                    "totalBytesReceived",
                    "totalMsgReceived",
                ],
            )
            .await?;

        let mut aggregates: BTreeMap<(String, String), (i64, i64)> = BTreeMap::new();
        for item in items {
            let (Some(service), Some(participant)) = (item.str_("service"), item.str_("name"))
            else {
                continue;
            };
            let entry = aggregates
                .entry((service.to_owned(), participant.to_owned()))
                .or_default();
            entry.0 += item.i64_("totalBytesReceived").unwrap_or_default();
            entry.1 += item.i64_("totalMsgReceived").unwrap_or_default();
        }

        let rows = aggregates
            .into_iter()
            .map(|((service, participant), (bytes, messages))| {
                let mut record = Record::new(&ORIGIN_SCHEMA);
                record.set(COL_BYTES_RECEIVED, bytes);
                record.set(COL_MSG_RECEIVED, messages);
                (
                    EntityKey::ServiceParticipant(service, participant),
                    record,
                )
            })
            .collect();
        Ok(Some(rows))
    }
}

pub static DESTINATION_DETAILS_SCHEMA: Schema = Schema {
    name: "federationDestinationDetails",
    columns: &[
        "state",
        "currentBandwidth",
        "totalBytesSent",
        "totalEntriesSent",
        "totalRecordsSent",
        "totalMsgSent",
    ],
};

pub static ORIGIN_DETAILS_SCHEMA: Schema = Schema {
    name: "federationOriginDetails",
    columns: &[
        "totalBytesReceived",
        "totalRecordsReceived",
        "totalEntriesReceived",
        "totalMsgReceived",
    ],
};

async fn participant_details(
    sender: &dyn RequestSender,
    model: &StatsModel,
    sub_type: &'static str,
    schema: &'static Schema,
    attributes: &[&str],
) -> Result<Option<Rows>, RetrieveError> {
    let Some((service, participant)) = model.selected_federation_participant() else {
        return Ok(None);
    };
    let mut names = vec!["nodeId"];
    names.extend_from_slice(attributes);
    let items = sender
        .get_attributes(
            &EntityQuery::new("federation")
                .with("subType", sub_type)
                .with("service", &service)
                .with("name", &participant),
            &names,
        )
        .await?;

    let mut rows = Rows::new();
    for item in items {
        let Some(node) = item.i64_("nodeId") else {
            continue;
        };
        let mut record = Record::new(schema);
        // Counters stay integral like their summary counterparts; only
        // genuinely fractional values (bandwidth) fall through to f64.
        for (column, attribute) in attributes.iter().enumerate() {
            if let Some(text) = item.str_(attribute) {
                record.set(column, text);
            } else if let Some(value) = item.i64_(attribute) {
                record.set(column, value);
            } else if let Some(value) = item.f64_(attribute) {
                record.set(column, value);
            }
        }
        rows.push((EntityKey::Id(node), record));
    }
    Ok(Some(rows))
}

pub struct FederationDestinationDetailsRetriever;

#[async_trait]
impl Retriever for FederationDestinationDetailsRetriever {
    fn schema(&self) -> &'static Schema {
        &DESTINATION_DETAILS_SCHEMA
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        participant_details(
            sender,
            model,
            "destination",
            &DESTINATION_DETAILS_SCHEMA,
            DESTINATION_DETAILS_SCHEMA.columns,
        )
        .await
    }
}

pub struct FederationOriginDetailsRetriever;

#[async_trait]
impl Retriever for FederationOriginDetailsRetriever {
    fn schema(&self) -> &'static Schema {
        &ORIGIN_DETAILS_SCHEMA
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        participant_details(
            sender,
            model,
            "origin",
            &ORIGIN_DETAILS_SCHEMA,
            ORIGIN_DETAILS_SCHEMA.columns,
        )
        .await
    }
}
