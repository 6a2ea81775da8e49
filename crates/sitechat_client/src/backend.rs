use sitechat_core::{CrawlProgress, Message, PreviousChatSummary};

use crate::api::{
    ChatMessagesResponse, ChatTreeResponse, CrawlRecord, CreateChatRequest, CreateChatResponse,
    QueryRequest, QueryResponse, ScrapeRequest, ScrapeResponse, SummarizeRequest,
    SummarizeResponse, WidgetIndexRequest, WidgetInitResponse, WidgetPage, WidgetQueryRequest,
    WidgetQueryResponse, WidgetRefreshResponse,
};
use crate::sse::ScrapeEventStream;
use crate::transport::HttpTransport;
use crate::{ClientError, ClientSettings};

/// The remote crawl/index/query service.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResponse, ClientError>;

    async fn scrape_stream(&self, request: &ScrapeRequest)
        -> Result<ScrapeEventStream, ClientError>;

    async fn crawl_progress(&self, crawl_id: &str) -> Result<CrawlProgress, ClientError>;

    async fn cancel_crawl(&self, crawl_id: &str) -> Result<(), ClientError>;

    async fn list_crawls(&self) -> Result<Vec<CrawlRecord>, ClientError>;

    async fn create_chat(&self, crawl_id: &str) -> Result<CreateChatResponse, ClientError>;

    async fn list_chats(&self) -> Result<Vec<PreviousChatSummary>, ClientError>;

    async fn delete_chat(&self, chat_id: &str) -> Result<(), ClientError>;

    async fn chat_tree(&self, chat_id: &str) -> Result<ChatTreeResponse, ClientError>;

    async fn chat_messages(&self, chat_id: &str) -> Result<Vec<Message>, ClientError>;

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, ClientError>;

    async fn summarize(&self, chat_id: &str) -> Result<SummarizeResponse, ClientError>;

    async fn widget_init(
        &self,
        site_id: &str,
        api_key: &str,
        pages: &[WidgetPage],
    ) -> Result<WidgetInitResponse, ClientError>;

    async fn widget_refresh(
        &self,
        site_id: &str,
        api_key: &str,
        pages: &[WidgetPage],
    ) -> Result<WidgetRefreshResponse, ClientError>;

    async fn widget_query(
        &self,
        site_id: &str,
        api_key: &str,
        query: &str,
        limit: u32,
    ) -> Result<WidgetQueryResponse, ClientError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    transport: HttpTransport,
}

impl ReqwestBackend {
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        Ok(Self {
            transport: HttpTransport::new(settings)?,
        })
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }
}

#[async_trait::async_trait]
impl Backend for ReqwestBackend {
    async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResponse, ClientError> {
        self.transport.post_json(&["scrape"], request).await
    }

    async fn scrape_stream(
        &self,
        request: &ScrapeRequest,
    ) -> Result<ScrapeEventStream, ClientError> {
        self.transport.open_stream(&["scrape", "stream"], request).await
    }

    async fn crawl_progress(&self, crawl_id: &str) -> Result<CrawlProgress, ClientError> {
        self.transport
            .get_json(&["crawls", crawl_id, "progress"])
            .await
    }

    async fn cancel_crawl(&self, crawl_id: &str) -> Result<(), ClientError> {
        self.transport.post_ack(&["crawls", crawl_id, "cancel"]).await
    }

    async fn list_crawls(&self) -> Result<Vec<CrawlRecord>, ClientError> {
        self.transport.get_json(&["crawls"]).await
    }

    async fn create_chat(&self, crawl_id: &str) -> Result<CreateChatResponse, ClientError> {
        let body = CreateChatRequest {
            crawl_id: crawl_id.to_string(),
        };
        self.transport.post_json(&["chats"], &body).await
    }

    async fn list_chats(&self) -> Result<Vec<PreviousChatSummary>, ClientError> {
        self.transport.get_json(&["chats"]).await
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<(), ClientError> {
        self.transport.delete(&["chats", chat_id]).await
    }

    async fn chat_tree(&self, chat_id: &str) -> Result<ChatTreeResponse, ClientError> {
        self.transport.get_json(&["chats", chat_id, "tree"]).await
    }

    async fn chat_messages(&self, chat_id: &str) -> Result<Vec<Message>, ClientError> {
        let response: ChatMessagesResponse = self
            .transport
            .get_json(&["chats", chat_id, "messages"])
            .await?;
        Ok(response.messages)
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, ClientError> {
        self.transport.post_json(&["query"], request).await
    }

    async fn summarize(&self, chat_id: &str) -> Result<SummarizeResponse, ClientError> {
        let body = SummarizeRequest {
            chat_id: chat_id.to_string(),
        };
        self.transport.post_json(&["summarize"], &body).await
    }

    async fn widget_init(
        &self,
        site_id: &str,
        api_key: &str,
        pages: &[WidgetPage],
    ) -> Result<WidgetInitResponse, ClientError> {
        let body = WidgetIndexRequest {
            site_id,
            api_key,
            pages,
        };
        self.transport.post_json(&["widget", "init"], &body).await
    }

    async fn widget_refresh(
        &self,
        site_id: &str,
        api_key: &str,
        pages: &[WidgetPage],
    ) -> Result<WidgetRefreshResponse, ClientError> {
        let body = WidgetIndexRequest {
            site_id,
            api_key,
            pages,
        };
        self.transport.post_json(&["widget", "refresh"], &body).await
    }

    async fn widget_query(
        &self,
        site_id: &str,
        api_key: &str,
        query: &str,
        limit: u32,
    ) -> Result<WidgetQueryResponse, ClientError> {
        let body = WidgetQueryRequest {
            site_id,
            api_key,
            query,
            limit,
        };
        self.transport.post_json(&["widget", "query"], &body).await
    }
}
