use super::IntentCategory;

/// Keyword/phrase table entry for the pattern tier.
#[derive(Debug, Clone)]
pub struct IntentPattern {
    pub category: IntentCategory,
    pub keywords: &'static [&'static str],
    pub phrases: &'static [&'static str],
    /// Higher priority patterns are checked first and win ties.
    pub priority: u8,
    /// Ceiling for the score this pattern can produce.
    pub confidence: f64,
}

/// Built-in table for retail and small-business conversations (Spanish first).
pub fn default_patterns() -> Vec<IntentPattern> {
    vec![
        IntentPattern {
            category: IntentCategory::Greeting,
            keywords: &["hola", "buenos", "buenas", "saludos", "hello", "hi"],
            phrases: &["buen día", "buenas tardes", "buenas noches", "cómo estás", "qué tal"],
            priority: 10,
            confidence: 0.9,
        },
        IntentPattern {
            category: IntentCategory::Farewell,
            keywords: &["adiós", "chao", "bye", "hasta luego", "nos vemos"],
            phrases: &["hasta pronto", "hasta mañana", "me despido"],
            priority: 10,
            confidence: 0.9,
        },
        IntentPattern {
            category: IntentCategory::Gratitude,
            keywords: &["gracias", "agradezco", "thanks"],
            phrases: &["muchas gracias", "mil gracias", "te agradezco", "thank you"],
            priority: 9,
            confidence: 0.9,
        },
        IntentPattern {
            category: IntentCategory::MarketingHelp,
            keywords: &["marketing", "estrategia", "promoción", "campaña", "publicidad"],
            phrases: &[
                "cómo promocionar",
                "estrategias de marketing",
                "plan de marketing",
                "marketing digital",
            ],
            priority: 8,
            confidence: 0.8,
        },
        IntentPattern {
            category: IntentCategory::SalesProblem,
            keywords: &["ventas", "vender", "clientes", "compras", "conversiones"],
            phrases: &[
                "no vendo",
                "bajas ventas",
                "aumentar ventas",
                "más clientes",
                "cómo vender más",
            ],
            priority: 8,
            confidence: 0.8,
        },
        IntentPattern {
            category: IntentCategory::SocialMedia,
            keywords: &["instagram", "facebook", "tiktok", "redes sociales", "social media"],
            phrases: &[
                "crecer en instagram",
                "estrategia instagram",
                "contenido redes",
                "seguidores instagram",
            ],
            priority: 8,
            confidence: 0.8,
        },
        IntentPattern {
            category: IntentCategory::Advertising,
            keywords: &["publicidad", "anuncios", "ads", "pauta", "presupuesto"],
            phrases: &[
                "publicidad pagada",
                "anuncios facebook",
                "inversión publicidad",
                "retorno inversión",
            ],
            priority: 7,
            confidence: 0.7,
        },
        IntentPattern {
            category: IntentCategory::ContentIdeas,
            keywords: &["contenido", "posts", "publicaciones", "ideas", "creatividad"],
            phrases: &[
                "qué publicar",
                "ideas contenido",
                "contenido atractivo",
                "posts creativos",
            ],
            priority: 7,
            confidence: 0.7,
        },
        IntentPattern {
            category: IntentCategory::CustomerService,
            keywords: &["atención", "cliente", "servicio", "soporte", "reclamos"],
            phrases: &[
                "mejorar atención",
                "experiencia cliente",
                "servicio postventa",
                "manejar quejas",
            ],
            priority: 7,
            confidence: 0.7,
        },
        IntentPattern {
            category: IntentCategory::Pricing,
            keywords: &["precio", "precios", "costos", "tarifas", "valor"],
            phrases: &[
                "cómo fijar precios",
                "estrategia precios",
                "aumentar precios",
                "precios competitivos",
            ],
            priority: 6,
            confidence: 0.6,
        },
        IntentPattern {
            category: IntentCategory::Competition,
            keywords: &["competencia", "competidores", "mercado", "benchmark"],
            phrases: &[
                "analizar competencia",
                "qué hace competencia",
                "ventaja competitiva",
                "diferenciarme",
            ],
            priority: 6,
            confidence: 0.6,
        },
        IntentPattern {
            category: IntentCategory::Branding,
            keywords: &["marca", "branding", "imagen", "identidad", "logo"],
            phrases: &[
                "construir marca",
                "imagen marca",
                "posicionamiento marca",
                "branding personal",
            ],
            priority: 6,
            confidence: 0.6,
        },
        IntentPattern {
            category: IntentCategory::Ecommerce,
            keywords: &["tienda online", "ecommerce", "sitio web", "venta online"],
            phrases: &[
                "crear tienda online",
                "vender por internet",
                "plataforma ecommerce",
                "envíos online",
            ],
            priority: 6,
            confidence: 0.6,
        },
        IntentPattern {
            category: IntentCategory::LocationHelp,
            keywords: &["ubicación", "local", "dirección", "cerca", "zona"],
            phrases: &[
                "dónde ubicarme",
                "mejor zona",
                "local comercial",
                "tráfico peatonal",
            ],
            priority: 5,
            confidence: 0.5,
        },
    ]
}
