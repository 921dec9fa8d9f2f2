//! Bundled batch-report descriptors. A type without a descriptor never
//! attempts the reporter path; a detail-type descriptor declares the
//! selection values substituted into its template before submission.

use crate::types::StatisticType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportParam {
    ServiceName,
    CacheName,
    ParticipantName,
    TierName,
}

impl ReportParam {
    fn placeholder(&self) -> &'static str {
        match self {
            ReportParam::ServiceName => "%SERVICE_NAME%",
            ReportParam::CacheName => "%CACHE_NAME%",
            ReportParam::ParticipantName => "%PARTICIPANT_NAME%",
            ReportParam::TierName => "%TIER_NAME%",
        }
    }
}

/// Live selection values available for substitution. Provided by the
/// retriever of the type being refreshed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportValues {
    pub service_name: Option<String>,
    pub cache_name: Option<String>,
    pub participant_name: Option<String>,
    pub tier_name: Option<String>,
}

#[derive(Debug)]
pub struct ReportDescriptor {
    pub name: &'static str,
    pub template: &'static str,
    pub params: &'static [ReportParam],
}

impl ReportDescriptor {
    /// Substitutes the declared selection values into the template.
    /// `None` when a required value has no current selection, in which
    /// case the reporter path is not usable this cycle.
    pub fn render(&self, values: &ReportValues) -> Option<String> {
        let mut rendered = self.template.to_owned();
        for param in self.params {
            let value = match param {
                ReportParam::ServiceName => values.service_name.as_deref(),
                ReportParam::CacheName => values.cache_name.as_deref(),
                ReportParam::ParticipantName => values.participant_name.as_deref(),
                ReportParam::TierName => values.tier_name.as_deref(),
            }?;
            rendered = rendered.replace(param.placeholder(), value);
        }
        Some(rendered)
    }
}

macro_rules! descriptor {
    ($ident:ident, $name:literal, $file:literal, [$($param:expr),*]) => {
        static $ident: ReportDescriptor = ReportDescriptor {
            name: $name,
            template: include_str!(concat!("../reports/", $file)),
            params: &[$($param),*],
        };
    };
}

descriptor!(SERVICE, "service-summary", "service_summary.xml", []);
descriptor!(
    SERVICE_DETAIL,
    "service-detail",
    "service_detail.xml",
    [ReportParam::ServiceName]
);
descriptor!(CACHE, "cache-summary", "cache_summary.xml", []);
descriptor!(
    CACHE_DETAIL,
    "cache-detail",
    "cache_detail.xml",
    [
        ReportParam::ServiceName,
        ReportParam::CacheName,
        ReportParam::TierName
    ]
);
descriptor!(TOPIC, "topic-summary", "topic_summary.xml", []);
descriptor!(MEMBER, "member-summary", "member_summary.xml", []);
descriptor!(MACHINE, "machine-summary", "machine_summary.xml", []);
descriptor!(PROXY, "proxy-summary", "proxy_summary.xml", []);
descriptor!(
    PERSISTENCE,
    "persistence-summary",
    "persistence_summary.xml",
    []
);
descriptor!(
    HTTP_SESSION,
    "http-session-summary",
    "http_session_summary.xml",
    []
);
descriptor!(
    FEDERATION_DESTINATION,
    "federation-destination",
    "federation_destination.xml",
    []
);
descriptor!(
    FEDERATION_ORIGIN,
    "federation-origin",
    "federation_origin.xml",
    []
);

pub fn descriptor_for(ty: StatisticType) -> Option<&'static ReportDescriptor> {
    match ty {
        StatisticType::Service => Some(&SERVICE),
        StatisticType::ServiceDetail => Some(&SERVICE_DETAIL),
        StatisticType::Cache => Some(&CACHE),
        StatisticType::CacheDetail => Some(&CACHE_DETAIL),
        StatisticType::Topic => Some(&TOPIC),
        StatisticType::Member => Some(&MEMBER),
        StatisticType::Machine => Some(&MACHINE),
        StatisticType::Proxy => Some(&PROXY),
        StatisticType::Persistence => Some(&PERSISTENCE),
        StatisticType::HttpSession => Some(&HTTP_SESSION),
        StatisticType::FederationDestination => Some(&FEDERATION_DESTINATION),
        StatisticType::FederationOrigin => Some(&FEDERATION_ORIGIN),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn summary_descriptor_renders_without_selection() {
        let rendered = MEMBER.render(&ReportValues::default());
        assert!(rendered.is_some());
    }

    #[test]
    fn detail_descriptor_requires_selection() {
        assert_eq!(CACHE_DETAIL.render(&ReportValues::default()), None);

        let values = ReportValues {
            service_name: Some("DistributedCache".into()),
            cache_name: Some("orders".into()),
            tier_name: Some("back".into()),
            ..Default::default()
        };
        let rendered = CACHE_DETAIL.render(&values).unwrap();
        assert!(rendered.contains("DistributedCache"));
        assert!(rendered.contains("orders"));
        assert!(!rendered.contains("%SERVICE_NAME%"));
    }

    #[test]
    fn types_without_descriptor_never_report() {
        assert!(descriptor_for(StatisticType::Cluster).is_none());
        assert!(descriptor_for(StatisticType::NodeStorage).is_none());
        assert!(descriptor_for(StatisticType::GrpcProxy).is_none());
    }
}
