//! Extend proxy, HTTP proxy and gRPC proxy statistics.

use super::{row_i64, row_str, Retriever, Rows};
use crate::{
    error::RetrieveError,
    model::StatsModel,
    transport::{EntityQuery, ReportRow, RequestSender},
    types::{EntityKey, Record, Schema},
};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Internal name-resolution service, excluded from proxy listings
/// unless explicitly included via settings.
const NAME_SERVICE: &str = "NameService";

pub static PROXY_SCHEMA: Schema = Schema {
    name: "proxy",
    columns: &[
        "hostIP",
        "connectionCount",
        "outgoingMessageBacklog",
        "totalBytesReceived",
        "totalBytesSent",
        "totalMessagesReceived",
        "totalMessagesSent",
    ],
};

pub const COL_HOST_IP: usize = 0;
pub const COL_CONNECTION_COUNT: usize = 1;
pub const COL_OUTGOING_BACKLOG: usize = 2;
pub const COL_BYTES_RECEIVED: usize = 3;
pub const COL_BYTES_SENT: usize = 4;
pub const COL_MESSAGES_RECEIVED: usize = 5;
pub const COL_MESSAGES_SENT: usize = 6;

fn include_proxy(model: &StatsModel, service: &str) -> bool {
    service != NAME_SERVICE || model.settings().include_name_service
}

pub struct ProxyRetriever;

#[async_trait]
impl Retriever for ProxyRetriever {
    fn schema(&self) -> &'static Schema {
        &PROXY_SCHEMA
    }

    fn from_report_row(&self, model: &StatsModel, row: &ReportRow) -> Option<(EntityKey, Record)> {
        let service = row_str(row, "name");
        if service.is_empty() || !include_proxy(model, &service) {
            return None;
        }
        let node = row_i64(row, "nodeId");
        let mut record = Record::new(&PROXY_SCHEMA);
        record.set(COL_HOST_IP, row_str(row, "hostIP"));
        record.set(COL_CONNECTION_COUNT, row_i64(row, "connectionCount"));
        record.set(COL_OUTGOING_BACKLOG, row_i64(row, "outgoingMessageBacklog"));
        record.set(COL_BYTES_RECEIVED, row_i64(row, "totalBytesReceived"));
        record.set(COL_BYTES_SENT, row_i64(row, "totalBytesSent"));
        record.set(COL_MESSAGES_RECEIVED, row_i64(row, "totalMessagesReceived"));
        record.set(COL_MESSAGES_SENT, row_i64(row, "totalMessagesSent"));
        Some((EntityKey::ServiceNode(service, node), record))
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("proxies"),
                &[
                    "name",
                    "nodeId",
                    "hostIP",
                    "connectionCount",
                    "outgoingMessageBacklog",
                    "totalBytesReceived",
                    "totalBytesSent",
                    "totalMessagesReceived",
                    "totalMessagesSent",
                ],
            )
            .await?;

        let mut rows = Rows::new();
        for item in items {
            let Some(service) = item.str_("name") else {
                continue;
            };
            if !include_proxy(model, service) {
                continue;
            }
            let node = item.i64_("nodeId").unwrap_or_default();
            let mut record = Record::new(&PROXY_SCHEMA);
            record.set(COL_HOST_IP, item.str_("hostIP").unwrap_or_default());
            record.set(
                COL_CONNECTION_COUNT,
                item.i64_("connectionCount").unwrap_or_default(),
            );
            record.set(
                COL_OUTGOING_BACKLOG,
                item.i64_("outgoingMessageBacklog").unwrap_or_default(),
            );
            record.set(
                COL_BYTES_RECEIVED,
                item.i64_("totalBytesReceived").unwrap_or_default(),
            );
            record.set(COL_BYTES_SENT, item.i64_("totalBytesSent").unwrap_or_default());
            record.set(
                COL_MESSAGES_RECEIVED,
                item.i64_("totalMessagesReceived").unwrap_or_default(),
            );
            record.set(
                COL_MESSAGES_SENT,
                item.i64_("totalMessagesSent").unwrap_or_default(),
            );
            rows.push((EntityKey::ServiceNode(service.to_owned(), node), record));
        }
        Ok(Some(rows))
    }
}

pub static HTTP_PROXY_SCHEMA: Schema = Schema {
    name: "httpProxy",
    columns: &[
        "httpServerType",
        "memberCount",
        "totalRequestCount",
        "totalErrorCount",
        "averageRequestTime",
    ],
};

pub const COL_SERVER_TYPE: usize = 0;
pub const COL_HTTP_MEMBER_COUNT: usize = 1;
pub const COL_TOTAL_REQUESTS: usize = 2;
pub const COL_TOTAL_ERRORS: usize = 3;
pub const COL_AVERAGE_REQUEST_TIME: usize = 4;

pub struct HttpProxyRetriever;

#[async_trait]
impl Retriever for HttpProxyRetriever {
    fn schema(&self) -> &'static Schema {
        &HTTP_PROXY_SCHEMA
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("httpProxies"),
                &[
                    "name",
                    "nodeId",
                    "httpServerType",
                    "totalRequestCount",
                    "totalErrorCount",
                    "averageRequestTime",
                ],
            )
            .await?;

        #[derive(Default)]
        struct HttpAggregate {
            server_type: String,
            members: i64,
            requests: i64,
            errors: i64,
            average_sum: f64,
        }

        let mut aggregates: BTreeMap<String, HttpAggregate> = BTreeMap::new();
        for item in items {
            let Some(service) = item.str_("name") else {
                continue;
            };
            let entry = aggregates.entry(service.to_owned()).or_default();
            if entry.server_type.is_empty() {
                entry.server_type = item.str_("httpServerType").unwrap_or_default().to_owned();
            }
            entry.members += 1;
            entry.requests += item.i64_("totalRequestCount").unwrap_or_default();
            entry.errors += item.i64_("totalErrorCount").unwrap_or_default();
            entry.average_sum += item.f64_("averageRequestTime").unwrap_or_default();
        }

        let rows = aggregates
            .into_iter()
            .map(|(service, aggregate)| {
                let mut record = Record::new(&HTTP_PROXY_SCHEMA);
                record.set(COL_SERVER_TYPE, aggregate.server_type);
                record.set(COL_HTTP_MEMBER_COUNT, aggregate.members);
                record.set(COL_TOTAL_REQUESTS, aggregate.requests);
                record.set(COL_TOTAL_ERRORS, aggregate.errors);
                record.set(
                    COL_AVERAGE_REQUEST_TIME,
                    if aggregate.members > 0 {
                        aggregate.average_sum / aggregate.members as f64
                    } else {
                        0.0
                    },
                );
                (EntityKey::Name(service), record)
            })
            .collect();
        Ok(Some(rows))
    }
}

pub static HTTP_PROXY_DETAIL_SCHEMA: Schema = Schema {
    name: "httpProxyDetail",
    columns: &[
        "totalRequestCount",
        "totalErrorCount",
        "averageRequestTime",
        "requestsPerSecond",
    ],
};

pub const COL_DETAIL_REQUESTS: usize = 0;
pub const COL_DETAIL_ERRORS: usize = 1;
pub const COL_DETAIL_AVERAGE: usize = 2;
pub const COL_DETAIL_THROUGHPUT: usize = 3;

pub struct HttpProxyDetailRetriever;

#[async_trait]
impl Retriever for HttpProxyDetailRetriever {
    fn schema(&self) -> &'static Schema {
        &HTTP_PROXY_DETAIL_SCHEMA
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let Some(service) = model.selected_http_proxy_service() else {
            return Ok(None);
        };
        let items = sender
            .get_attributes(
                &EntityQuery::new("httpProxies").with("name", &service),
                &[
                    "nodeId",
                    "totalRequestCount",
                    "totalErrorCount",
                    "averageRequestTime",
                    "requestsPerSecond",
                ],
            )
            .await?;

        let mut rows = Rows::new();
        for item in items {
            let Some(node) = item.i64_("nodeId") else {
                continue;
            };
            let mut record = Record::new(&HTTP_PROXY_DETAIL_SCHEMA);
            record.set(
                COL_DETAIL_REQUESTS,
                item.i64_("totalRequestCount").unwrap_or_default(),
            );
            record.set(
                COL_DETAIL_ERRORS,
                item.i64_("totalErrorCount").unwrap_or_default(),
            );
            record.set(
                COL_DETAIL_AVERAGE,
                item.f64_("averageRequestTime").unwrap_or_default(),
            );
            record.set(
                COL_DETAIL_THROUGHPUT,
                item.f64_("requestsPerSecond").unwrap_or_default(),
            );
            rows.push((EntityKey::Id(node), record));
        }
        Ok(Some(rows))
    }
}

pub static GRPC_PROXY_SCHEMA: Schema = Schema {
    name: "grpcProxy",
    columns: &[
        "responsesSentCount",
        "messagesReceivedCount",
        "errorRequestCount",
        "taskBacklog",
    ],
};

pub const COL_RESPONSES_SENT: usize = 0;
pub const COL_GRPC_MESSAGES_RECEIVED: usize = 1;
pub const COL_ERROR_REQUESTS: usize = 2;
pub const COL_GRPC_TASK_BACKLOG: usize = 3;

pub struct GrpcProxyRetriever;

#[async_trait]
impl Retriever for GrpcProxyRetriever {
    fn schema(&self) -> &'static Schema {
        &GRPC_PROXY_SCHEMA
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("grpcProxies"),
                &[
                    "name",
                    "nodeId",
                    "responsesSentCount",
                    "messagesReceivedCount",
                    "errorRequestCount",
                    "taskBacklog",
                ],
            )
            .await?;

        let mut rows = Rows::new();
        for item in items {
            let Some(service) = item.str_("name") else {
                continue;
            };
            let node = item.i64_("nodeId").unwrap_or_default();
            let mut record = Record::new(&GRPC_PROXY_SCHEMA);
            record.set(
                COL_RESPONSES_SENT,
                item.i64_("responsesSentCount").unwrap_or_default(),
            );
            record.set(
                COL_GRPC_MESSAGES_RECEIVED,
                item.i64_("messagesReceivedCount").unwrap_or_default(),
            );
            record.set(
                COL_ERROR_REQUESTS,
                item.i64_("errorRequestCount").unwrap_or_default(),
            );
            record.set(COL_GRPC_TASK_BACKLOG, item.i64_("taskBacklog").unwrap_or_default());
            rows.push((EntityKey::ServiceNode(service.to_owned(), node), record));
        }
        Ok(Some(rows))
    }
}
