//! Response envelope for catalog endpoints.

use serde::Serialize;

use crate::Request;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkDto {
    pub href: String,
    pub rel: &'static str,
    #[serde(rename = "type")]
    pub method: String,
}

impl LinkDto {
    /// A `self` link pointing at `request`'s own target.
    pub fn to_self(request: &Request) -> Self {
        let host = request.host().unwrap_or("localhost");
        let href = match request.query_string() {
            Some(query) if !query.is_empty() => format!("http://{host}{}?{query}", request.path()),
            _ => format!("http://{host}{}", request.path()),
        };
        Self {
            href,
            rel: "self",
            method: request.method().as_str().to_owned(),
        }
    }
}

/// `{ data, pageIndex?, pageSize?, recordCount?, links }`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestDto<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<usize>,
    pub links: Vec<LinkDto>,
}

impl<T> RestDto<T> {
    pub fn new(data: T, link: LinkDto) -> Self {
        Self {
            data,
            page_index: None,
            page_size: None,
            record_count: None,
            links: vec![link],
        }
    }

    #[must_use]
    pub fn paged(mut self, page_index: usize, page_size: usize, record_count: usize) -> Self {
        self.page_index = Some(page_index);
        self.page_size = Some(page_size);
        self.record_count = Some(record_count);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_link_keeps_query_and_method() {
        let raw = b"GET /catalog?filterText=Mars&pageSize=2 HTTP/1.1\r\nHost: games.local:8080\r\n\r\n";
        let (request, _) = Request::parse(raw).unwrap();
        let link = LinkDto::to_self(&request);
        assert_eq!(link.href, "http://games.local:8080/catalog?filterText=Mars&pageSize=2");
        assert_eq!(link.rel, "self");
        assert_eq!(link.method, "GET");
    }

    #[test]
    fn unpaged_envelope_omits_paging_fields() {
        let raw = b"DELETE /catalog/5 HTTP/1.1\r\nHost: h\r\n\r\n";
        let (request, _) = Request::parse(raw).unwrap();
        let json = serde_json::to_value(RestDto::new(
            Option::<u8>::None,
            LinkDto::to_self(&request),
        ))
        .unwrap();
        assert!(json["data"].is_null());
        assert!(json.get("pageIndex").is_none());
        assert_eq!(json["links"][0]["type"], "DELETE");
    }
}
