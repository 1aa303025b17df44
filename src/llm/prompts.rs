//! Prompt templates for triage generation
//!
//! The header vocabulary and tier keywords here are shared with
//! [`super::parser`]. Any change to either side bumps [`PROTOCOL_VERSION`].

use std::collections::HashMap;
use std::fmt::Write;

use crate::models::UrgencyLevel;

/// Version of the prompt/parser contract
pub const PROTOCOL_VERSION: &str = "manchester-v1";

pub const CLASSIFICATION_HEADER: &str = "CLASSIFICAÇÃO:";
pub const ANALYSIS_HEADER: &str = "ANÁLISE CLÍNICA:";
pub const RECOMMENDATIONS_HEADER: &str = "CONDUTAS RECOMENDADAS:";

/// Marker preceding the patient's symptoms in the prompt
pub const SYMPTOMS_MARKER: &str = "SINTOMAS DO PACIENTE:";
const PROTOCOL_MARKER: &str = "PROTOCOLO DE MANCHESTER:";

const NO_SIMILAR_CASES: &str = "Nenhum caso similar validado disponível.";

/// Template for generating prompts
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Create a new prompt template
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Fill in the template with variables
    ///
    /// Single pass over the template: substituted values are never scanned
    /// for placeholders, so user text containing `{{...}}` stays literal.
    /// Unknown placeholders are kept as written.
    #[must_use]
    pub fn render(&self, values: &HashMap<&str, &str>) -> String {
        let mut result = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find("{{") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let name = &after[..end];
                    match values.get(name) {
                        Some(value) => result.push_str(value),
                        None => {
                            result.push_str("{{");
                            result.push_str(name);
                            result.push_str("}}");
                        }
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    result.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        result.push_str(rest);
        result
    }
}

/// Triage prompt template
///
/// Placeholders: `protocol`, `symptoms`, `similar_cases`.
fn triage_template() -> PromptTemplate {
    PromptTemplate::new(format!(
        r"Você é um sistema especializado em triagem hospitalar baseado no Protocolo de Manchester.

Sua tarefa é analisar os sintomas do paciente e fornecer:
1. Uma classificação de urgência (VERMELHO, LARANJA, AMARELO, VERDE ou AZUL)
2. Uma justificativa clínica detalhada para a classificação
3. Condutas recomendadas específicas para o caso

{SYMPTOMS_MARKER}
{{{{symptoms}}}}

{PROTOCOL_MARKER}
{{{{protocol}}}}

CASOS SIMILARES VALIDADOS:
{{{{similar_cases}}}}

Forneça sua resposta no seguinte formato exato, com as três seções nesta ordem:

{CLASSIFICATION_HEADER} [COR]

{ANALYSIS_HEADER}
[Análise detalhada dos sintomas, explicando por que se enquadram na classificação escolhida. Inclua possíveis diagnósticos diferenciais e fatores de risco.]

{RECOMMENDATIONS_HEADER}
[Liste pelo menos 5 condutas específicas recomendadas para este caso, incluindo exames, medicações e orientações.]

É ESSENCIAL que você forneça uma análise clínica detalhada e condutas específicas, não apenas a classificação."
    ))
}

/// One line per tier, e.g. `- LARANJA (Muito Urgente): Risco alto. Atendimento em até 10 minutos.`
pub fn protocol_definitions() -> String {
    let mut out = String::new();
    for level in UrgencyLevel::PRIORITY_ORDER {
        let wait = match level.max_wait_minutes() {
            0 => "Atendimento imediato.".to_string(),
            minutes => format!("Atendimento em até {minutes} minutos."),
        };
        let _ = writeln!(
            out,
            "- {} ({}): {}. {}",
            level.label(),
            level.description(),
            level.risk(),
            wait
        );
    }
    out.trim_end().to_string()
}

/// Build the triage prompt
///
/// `similar_cases` is the already-assembled context block; an empty block is
/// replaced by an explicit "no cases" line. Deterministic in its inputs.
#[must_use]
pub fn build_triage_prompt(symptoms: &str, similar_cases: &str) -> String {
    let protocol = protocol_definitions();
    let cases = if similar_cases.trim().is_empty() {
        NO_SIMILAR_CASES
    } else {
        similar_cases.trim()
    };

    let mut values = HashMap::new();
    values.insert("symptoms", symptoms.trim());
    values.insert("protocol", protocol.as_str());
    values.insert("similar_cases", cases);
    triage_template().render(&values)
}

/// Symptoms embedded in a prompt built by [`build_triage_prompt`]
#[must_use]
pub fn extract_symptoms(prompt: &str) -> Option<&str> {
    let start = prompt.find(SYMPTOMS_MARKER)? + SYMPTOMS_MARKER.len();
    let rest = &prompt[start..];
    let end = rest.find(PROTOCOL_MARKER).unwrap_or(rest.len());
    let symptoms = rest[..end].trim();
    (!symptoms.is_empty()).then_some(symptoms)
}

/// Answer used when every generation attempt failed
///
/// Classifies as [`UrgencyLevel::SAFE_DEFAULT`] and says why.
#[must_use]
pub fn fallback_response() -> String {
    let level = UrgencyLevel::SAFE_DEFAULT;
    format!(
        "{CLASSIFICATION_HEADER} {label}

{ANALYSIS_HEADER}
Não foi possível realizar a análise automatizada devido a falha no serviço de geração. Por precaução, o paciente recebeu classificação {label} ({description}).

{RECOMMENDATIONS_HEADER}
1. Avaliação médica em até {minutes} minutos
2. Monitoramento de sinais vitais
3. Reavaliação da classificação por profissional de saúde
4. Documentação do caso como incidente técnico
5. Verificação manual dos sintomas relatados",
        label = level.label(),
        description = level.description(),
        minutes = level.max_wait_minutes(),
    )
}
