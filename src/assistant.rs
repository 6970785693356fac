// 🤖 Financial Assistant
// Questions go to an optional remote text service with the user's financial
// context attached. When there is no service, or it fails, a local keyword
// matcher answers the common questions instead.

use crate::db::Transaction;
use crate::entities::Category;
use crate::error::FinanceResult;
use crate::format::{format_currency, format_date};
use crate::goals::{progress_percent, MonthlyGoal};
use crate::statistics::{monthly_transactions, recent, top_categories, total_amount, Statistics};
use crate::temporal::{day_key, days_to_close, month_key, yesterday};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const EXPENSE_PATTERN: &str = r"gastei\s+(\d+(?:,\d+)?)\s*reais?\s+(?:no?|na|em)\s+(.+)";

// ============================================================================
// TEXT SERVICE
// ============================================================================

/// Opaque text-in / text-out collaborator
#[async_trait]
pub trait TextService: Send + Sync {
    async fn ask(&self, prompt: &str) -> FinanceResult<String>;
}

#[cfg(feature = "gemini")]
pub use gemini::GeminiClient;

#[cfg(feature = "gemini")]
mod gemini {
    use super::TextService;
    use crate::config::AiSettings;
    use crate::error::{FinanceError, FinanceResult};
    use async_trait::async_trait;
    use reqwest::Client;
    use serde::{Deserialize, Serialize};

    const NO_ANSWER: &str = "Não foi possível obter resposta.";

    /// Gemini `generateContent` client. No explicit timeout: the transport
    /// default applies.
    pub struct GeminiClient {
        client: Client,
        api_key: String,
        model: String,
        base_url: String,
        temperature: f32,
        max_output_tokens: u32,
    }

    impl GeminiClient {
        /// None when no API key is configured
        pub fn from_settings(settings: &AiSettings) -> Option<Self> {
            let api_key = settings.api_key.clone().filter(|k| !k.trim().is_empty())?;

            Some(GeminiClient {
                client: Client::new(),
                api_key,
                model: settings.model.clone(),
                base_url: settings.base_url.trim_end_matches('/').to_string(),
                temperature: settings.temperature,
                max_output_tokens: settings.max_output_tokens,
            })
        }

        fn api_url(&self) -> String {
            format!(
                "{}/models/{}:generateContent?key={}",
                self.base_url, self.model, self.api_key
            )
        }
    }

    #[async_trait]
    impl TextService for GeminiClient {
        async fn ask(&self, prompt: &str) -> FinanceResult<String> {
            let request = GenerateContentRequest {
                contents: vec![Content {
                    parts: vec![Part {
                        text: Some(prompt.to_string()),
                    }],
                }],
                generation_config: GenerationConfig {
                    temperature: self.temperature,
                    max_output_tokens: self.max_output_tokens,
                },
            };

            tracing::debug!(model = %self.model, prompt_len = prompt.len(), "sending request to Gemini");

            let response = self
                .client
                .post(self.api_url())
                .json(&request)
                .send()
                .await
                .map_err(|e| FinanceError::Service(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(FinanceError::Service(format!(
                    "Gemini API error {}: {}",
                    status, body
                )));
            }

            let parsed: GenerateContentResponse = response
                .json()
                .await
                .map_err(|e| FinanceError::Service(format!("Failed to parse response: {}", e)))?;

            Ok(parsed.first_text().unwrap_or_else(|| NO_ANSWER.to_string()))
        }
    }

    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct GenerateContentRequest {
        contents: Vec<Content>,
        generation_config: GenerationConfig,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Content {
        #[serde(default)]
        parts: Vec<Part>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Part {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    }

    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct GenerationConfig {
        temperature: f32,
        max_output_tokens: u32,
    }

    #[derive(Debug, Deserialize)]
    struct GenerateContentResponse {
        #[serde(default)]
        candidates: Vec<Candidate>,
    }

    #[derive(Debug, Deserialize)]
    struct Candidate {
        content: Option<Content>,
    }

    impl GenerateContentResponse {
        fn first_text(self) -> Option<String> {
            self.candidates
                .into_iter()
                .next()?
                .content?
                .parts
                .into_iter()
                .next()?
                .text
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_requires_api_key() {
            assert!(GeminiClient::from_settings(&AiSettings::default()).is_none());

            let settings = AiSettings {
                api_key: Some("k".to_string()),
                base_url: "http://localhost/v1beta/".to_string(),
                ..AiSettings::default()
            };
            let client = GeminiClient::from_settings(&settings).unwrap();
            assert_eq!(
                client.api_url(),
                "http://localhost/v1beta/models/gemini-pro:generateContent?key=k"
            );
        }

        #[test]
        fn test_request_shape() {
            let request = GenerateContentRequest {
                contents: vec![Content {
                    parts: vec![Part {
                        text: Some("oi".to_string()),
                    }],
                }],
                generation_config: GenerationConfig {
                    temperature: 0.5,
                    max_output_tokens: 800,
                },
            };
            let json = serde_json::to_value(&request).unwrap();
            assert_eq!(json["contents"][0]["parts"][0]["text"], "oi");
            assert_eq!(json["generationConfig"]["maxOutputTokens"], 800);
        }

        #[test]
        fn test_first_text() {
            let parsed: GenerateContentResponse = serde_json::from_str(
                r#"{ "candidates": [ { "content": { "parts": [ { "text": "Olá!" } ] } } ] }"#,
            )
            .unwrap();
            assert_eq!(parsed.first_text(), Some("Olá!".to_string()));

            let empty: GenerateContentResponse = serde_json::from_str("{}").unwrap();
            assert_eq!(empty.first_text(), None);
        }
    }
}

// ============================================================================
// PROMPT
// ============================================================================

/// Snapshot of the user's numbers, embedded in every remote prompt
pub fn build_context(
    transactions: &[Transaction],
    goal: &MonthlyGoal,
    categories: &[Category],
    today: NaiveDate,
) -> String {
    let stats = Statistics::compute(transactions);
    let month = month_key(today);
    let monthly_total = total_amount(monthly_transactions(transactions, &month));

    let top = top_categories(transactions, 5)
        .into_iter()
        .map(|(category, amount)| format!("- {}: {}", category, format_currency(amount)))
        .collect::<Vec<_>>()
        .join("\n");

    let latest = recent(transactions, 10)
        .into_iter()
        .map(|t| {
            format!(
                "- {}: {} - {} ({})",
                format_date(&t.date),
                t.name,
                format_currency(t.amount),
                t.category.as_deref().unwrap_or("Sem categoria")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let names = categories
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "DADOS FINANCEIROS DO USUÁRIO:\n\n\
         Meta Mensal: {}\n\
         Gasto Atual do Mês: {}\n\
         Gasto Total Registrado: {}\n\
         Total de Transações: {}\n\
         Média por Transação: {}\n\
         Maior Gasto: {}\n\
         Menor Gasto: {}\n\n\
         Dias para Fechamento: {}\n\
         Melhor Dia para Compras: {}\n\n\
         Top 5 Categorias:\n{}\n\n\
         Transações Recentes:\n{}\n\n\
         Categorias Disponíveis: {}",
        format_currency(goal.goal),
        format_currency(monthly_total),
        format_currency(stats.total),
        stats.count,
        format_currency(stats.average),
        format_currency(stats.largest),
        format_currency(stats.smallest),
        days_to_close(today, goal.due_date),
        goal.best_buy_date,
        top,
        latest,
        names
    )
}

pub fn build_prompt(app_name: &str, context: &str, question: &str) -> String {
    format!(
        "Você é um assistente financeiro pessoal inteligente do sistema {app}.\n\n\
         Suas funções principais:\n\
         1. Responder perguntas sobre os gastos e finanças do usuário\n\
         2. Fornecer insights e análises financeiras\n\
         3. Dar conselhos sobre gestão financeira\n\
         4. Responder perguntas gerais quando solicitado\n\
         5. Ajudar com funcionalidades do sistema\n\
         6. Adicionar transações quando o usuário disser algo como \"gastei X reais em Y\"\n\n\
         Contexto financeiro do usuário:\n{context}\n\n\
         Responda sempre em português brasileiro, seja claro, útil e amigável.\n\
         Use formatação simples quando necessário.\n\
         Para valores monetários, use o formato R$ X,XX.\n\n\
         Se a pergunta não for sobre finanças, responda de forma útil e educativa.\n\n\
         Pergunta do usuário: {question}",
        app = app_name,
        context = context,
        question = question
    )
}

// ============================================================================
// HISTORY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiInteraction {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
    pub context: String,
}

impl AiInteraction {
    pub fn new(question: &str, answer: &str, now: DateTime<Utc>) -> Self {
        AiInteraction {
            id: uuid::Uuid::new_v4().to_string(),
            question: question.trim().to_string(),
            answer: answer.trim().to_string(),
            timestamp: now,
            context: "financial".to_string(),
        }
    }
}

/// Newest first, at most `max` entries
pub fn push_history(history: &mut Vec<AiInteraction>, interaction: AiInteraction, max: usize) {
    history.insert(0, interaction);
    history.truncate(max);
}

// ============================================================================
// LOCAL FALLBACK
// ============================================================================

/// What the local matcher decided to do with a question
#[derive(Debug, Clone, PartialEq)]
pub enum LocalIntent {
    /// "gastei 50 reais no bar": record a new expense
    AddExpense {
        amount: f64,
        place: String,
        category: String,
    },
    /// Plain text answer
    Answer(String),
}

fn expense_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EXPENSE_PATTERN).expect("expense pattern is valid"))
}

/// Rough category for a place named in a chat message
fn guess_category(place: &str) -> &'static str {
    let has = |words: &[&str]| words.iter().any(|w| place.contains(w));

    if has(&["bar", "restaurante", "lanchonete"]) {
        "Alimentação"
    } else if has(&["posto", "combustível"]) {
        "Transporte"
    } else if has(&["cinema", "show", "festa"]) {
        "Lazer"
    } else if has(&["farmácia", "médico"]) {
        "Saúde"
    } else {
        "Outros"
    }
}

/// Keyword rules, first match wins
pub fn local_answer(
    question: &str,
    transactions: &[Transaction],
    goal: &MonthlyGoal,
    today: NaiveDate,
) -> LocalIntent {
    let query = question.to_lowercase();

    if let Some(caps) = expense_regex().captures(&query) {
        let amount = caps[1].replace(',', ".").parse::<f64>().unwrap_or(0.0);
        let place = caps[2].trim().to_string();
        let category = guess_category(&place).to_string();
        return LocalIntent::AddExpense {
            amount,
            place,
            category,
        };
    }

    LocalIntent::Answer(answer_query(&query, transactions, goal, today))
}

fn answer_query(query: &str, transactions: &[Transaction], goal: &MonthlyGoal, today: NaiveDate) -> String {
    let month = month_key(today);
    let monthly = monthly_transactions(transactions, &month);
    let monthly_total = total_amount(monthly.iter().copied());
    let monthly_in = |category: &str| -> f64 {
        total_amount(
            monthly
                .iter()
                .copied()
                .filter(|t| t.category.as_deref() == Some(category)),
        )
    };

    if query.contains("gastei") || query.contains("gasto") {
        if query.contains("mês") || query.contains("mensal") {
            return format!(
                "Este mês você gastou {} em {} transações.",
                format_currency(monthly_total),
                monthly.len()
            );
        }

        if query.contains("lazer") {
            return format!(
                "Este mês você gastou {} com lazer.",
                format_currency(monthly_in("Lazer"))
            );
        }

        if query.contains("alimentação") || query.contains("comida") || query.contains("restaurante") {
            return format!(
                "Este mês você gastou {} com alimentação.",
                format_currency(monthly_in("Alimentação"))
            );
        }

        for tx in transactions {
            let payee = tx.name.to_lowercase();
            if query.contains(&payee) {
                let total = total_amount(
                    transactions
                        .iter()
                        .filter(|t| t.name.to_lowercase().contains(&payee)),
                );
                return format!("Você gastou {} no {}.", format_currency(total), tx.name);
            }
        }

        let stats = Statistics::compute(transactions);
        return format!(
            "Seu gasto total é {} em {} transações.",
            format_currency(stats.total),
            stats.count
        );
    }

    if query.contains("categoria") {
        let top = top_categories(transactions, 5);
        if top.is_empty() {
            return "Você ainda não tem gastos categorizados.".to_string();
        }
        let lines = top
            .iter()
            .map(|(category, amount)| format!("• {}: {}", category, format_currency(*amount)))
            .collect::<Vec<_>>()
            .join("\n");
        return format!("Suas principais categorias são:\n{}", lines);
    }

    if query.contains("meta") || query.contains("objetivo") {
        let progress = progress_percent(monthly_total, goal.goal);
        let remaining = (goal.goal - monthly_total).max(0.0);
        return format!(
            "Sua meta mensal é {}. Você já gastou {} ({:.1}%). Ainda pode gastar {}.",
            format_currency(goal.goal),
            format_currency(monthly_total),
            progress,
            format_currency(remaining)
        );
    }

    if query.contains("hoje") || query.contains("ontem") {
        let is_today = query.contains("hoje");
        let day = if is_today { today } else { yesterday(today) };
        let key = day_key(day);

        let on_day: Vec<&Transaction> = transactions
            .iter()
            .filter(|t| t.date.starts_with(&key))
            .collect();
        if on_day.is_empty() {
            return format!(
                "Nenhum gasto registrado {}.",
                if is_today { "hoje" } else { "ontem" }
            );
        }

        let total = total_amount(on_day.iter().copied());
        return format!(
            "{} você gastou {} em {} transações.",
            if is_today { "Hoje" } else { "Ontem" },
            format_currency(total),
            on_day.len()
        );
    }

    if query.contains("ajuda") || query.contains("help") {
        return "Posso ajudar você com:\n\
                • Análise de gastos e categorias\n\
                • Acompanhamento de metas\n\
                • Relatórios financeiros\n\
                • Dicas de economia\n\
                • Funcionalidades do sistema\n\n\
                Pergunte algo como \"quanto gastei este mês?\" ou \"qual minha categoria que mais gasto?\""
            .to_string();
    }

    if query.contains("tempo") || query.contains("clima") {
        return "Não tenho acesso a informações meteorológicas, mas posso ajudar com suas finanças! \
                Que tal verificar seus gastos recentes ou definir uma meta de economia?"
            .to_string();
    }

    "Desculpe, não entendi sua pergunta. Posso ajudar com informações sobre seus gastos, \
     categorias, metas e análises financeiras. Tente perguntar sobre um estabelecimento específico \
     ou categoria de gastos."
        .to_string()
}

/// Reply after an AddExpense intent was stored
pub fn expense_added_reply(amount: f64, place: &str, category: &str) -> String {
    format!(
        "Transação adicionada: {} em \"{}\" na categoria {}. ✅",
        format_currency(amount),
        place,
        category
    )
}

// ============================================================================
// TEST SUPPORT
// ============================================================================


// ============================================================================
// TESTS
// ============================================================================
