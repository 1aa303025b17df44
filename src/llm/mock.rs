//! Offline keyword backend
//!
//! Answers from a fixed table chosen by symptom keywords. Used by the demo CLI
//! and in disconnected environments where no generation service is running.
//! The answers use the short header spellings (`Classificação`,
//! `Justificativa`, `Condutas`) on their own lines.

use async_trait::async_trait;
use tracing::debug;

use super::client::CompletionRequest;
use super::client::GenerationBackend;
use super::prompts::extract_symptoms;
use crate::errors::Result;
use crate::models::UrgencyLevel;

struct CannedAnswer {
    level: UrgencyLevel,
    keywords: &'static [&'static str],
    justification: &'static str,
    recommendations: &'static [&'static str],
}

/// Checked in order; the first rule with a matching keyword answers
const RULES: &[CannedAnswer] = &[
    CannedAnswer {
        level: UrgencyLevel::Vermelho,
        keywords: &["parada", "inconsciente", "choque", "não responde", "sangramento intenso"],
        justification: "Paciente apresenta sinais de comprometimento crítico das funções vitais com necessidade de intervenção imediata. A alteração do nível de consciência associada à instabilidade hemodinâmica indica risco iminente de morte.",
        recommendations: &[
            "Acesso venoso calibroso imediato",
            "Monitorização contínua de sinais vitais",
            "Avaliação médica imediata (tempo zero)",
            "Preparo para suporte avançado de vida",
            "Exames laboratoriais de emergência (gasometria, eletrólitos, hemograma)",
        ],
    },
    CannedAnswer {
        level: UrgencyLevel::Laranja,
        keywords: &["dor torácica", "dispneia grave", "confusão", "convulsão"],
        justification: "Paciente apresenta sintomas sugestivos de condição potencialmente ameaçadora à vida. A dor torácica associada a outros sintomas pode indicar síndrome coronariana aguda que requer avaliação e intervenção rápidas.",
        recommendations: &[
            "Monitorização cardíaca",
            "Acesso venoso periférico",
            "ECG de 12 derivações em até 10 minutos",
            "Avaliação médica em até 10 minutos",
            "Coleta de enzimas cardíacas",
        ],
    },
    CannedAnswer {
        level: UrgencyLevel::Amarelo,
        keywords: &["febre alta", "vômitos", "desidratação", "dor moderada"],
        justification: "Paciente apresenta sintomas compatíveis com processo infeccioso agudo. A febre elevada sugere necessidade de avaliação médica em prazo reduzido para investigação etiológica e início de tratamento.",
        recommendations: &[
            "Verificar sinais vitais completos",
            "Solicitar hemograma completo e PCR",
            "Administrar antitérmico se necessário",
            "Reavaliação médica em até 60 minutos",
        ],
    },
    CannedAnswer {
        level: UrgencyLevel::Verde,
        keywords: &["dor leve", "tosse", "resfriado", "mal estar"],
        justification: "Paciente apresenta quadro clínico estável com sintomas de início recente, sem sinais de alerta e sem indicativos de deterioração iminente.",
        recommendations: &[
            "Verificar sinais vitais",
            "Avaliação médica em até 120 minutos",
            "Orientações sobre sintomáticos",
            "Retorno se piora ou persistência dos sintomas",
        ],
    },
    CannedAnswer {
        level: UrgencyLevel::Azul,
        keywords: &["renovação", "atestado", "crônico", "consulta de rotina"],
        justification: "Paciente em condição crônica estável, sem alterações agudas. Apresenta-se para atendimento eletivo sem caracterização de urgência ou emergência.",
        recommendations: &[
            "Verificar sinais vitais",
            "Encaminhar para atendimento ambulatorial",
            "Orientar sobre agendamento de consulta eletiva",
            "Avaliação médica conforme disponibilidade do serviço",
        ],
    },
];

static DEFAULT_ANSWER: CannedAnswer = CannedAnswer {
    level: UrgencyLevel::SAFE_DEFAULT,
    keywords: &[],
    justification: "Paciente apresenta quadro clínico que requer avaliação médica em tempo oportuno. Os sintomas descritos não representam risco imediato à vida, mas necessitam de investigação para prevenir complicações.",
    recommendations: &[
        "Verificar sinais vitais a cada 60 minutos",
        "Avaliação médica em até 60 minutos",
        "Exames laboratoriais conforme avaliação médica",
        "Orientar retorno imediato se piora dos sintomas",
    ],
};

impl CannedAnswer {
    fn render(&self) -> String {
        let recommendations = self
            .recommendations
            .iter()
            .map(|r| format!("- {r}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Classificação\n{}\n\nJustificativa\n{}\n\nCondutas\n{}",
            self.level.label().to_lowercase(),
            self.justification,
            recommendations
        )
    }
}

/// Generation backend answering from symptom keywords
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordMockBackend;

impl KeywordMockBackend {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Canned answer for a symptoms description
    #[must_use]
    pub fn answer(symptoms: &str) -> String {
        let lowered = symptoms.to_lowercase();
        let rule = RULES
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| lowered.contains(k)))
            .unwrap_or(&DEFAULT_ANSWER);
        debug!("Mock backend answering {}", rule.level);
        rule.render()
    }
}

#[async_trait]
impl GenerationBackend for KeywordMockBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let symptoms = extract_symptoms(&request.prompt).unwrap_or(&request.prompt);
        Ok(Self::answer(symptoms))
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ResponseParser;
    use crate::models::Classification;

    fn classify(symptoms: &str) -> Classification {
        ResponseParser::parse(&KeywordMockBackend::answer(symptoms)).classification
    }

    #[test]
    fn test_keyword_tiers() {
        assert_eq!(classify("Paciente inconsciente"), Classification::Tier(UrgencyLevel::Vermelho));
        assert_eq!(
            classify("DOR TORÁCICA intensa, sudorese"),
            Classification::Tier(UrgencyLevel::Laranja)
        );
        assert_eq!(classify("febre alta há 2 dias"), Classification::Tier(UrgencyLevel::Amarelo));
        assert_eq!(classify("tosse seca"), Classification::Tier(UrgencyLevel::Verde));
        assert_eq!(classify("renovação de receita"), Classification::Tier(UrgencyLevel::Azul));
    }

    #[test]
    fn test_unmatched_symptoms_get_safe_default() {
        assert_eq!(
            classify("formigamento no pé"),
            Classification::Tier(UrgencyLevel::SAFE_DEFAULT)
        );
    }

    #[test]
    fn test_answers_have_all_sections() {
        let parsed = ResponseParser::parse(&KeywordMockBackend::answer("convulsão"));
        assert!(!parsed.justification.is_empty());
        assert!(parsed.recommendations.starts_with("- "));
    }

    #[tokio::test]
    async fn test_complete_reads_symptoms_from_prompt() {
        // The protocol section names every tier; only the symptoms must drive the answer
        let prompt = crate::llm::prompts::build_triage_prompt("tosse e coriza", "");
        let request = CompletionRequest {
            prompt,
            temperature: 0.2,
            top_p: 0.9,
            stream: false,
        };
        let raw = KeywordMockBackend::new().complete(&request).await.unwrap();
        assert_eq!(
            ResponseParser::parse(&raw).classification,
            Classification::Tier(UrgencyLevel::Verde)
        );
    }
}
