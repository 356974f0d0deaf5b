use serde::{Deserialize, Serialize};
use std::path::Path;

/// Risk-scaling methodology applied to a strategy source file.
///
/// The two variants are structurally parallel but textually independent:
/// each binds its own marker string, injected blocks and output suffix.
/// They evolve separately and must never be merged into one recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Methodology {
    /// Fixed risk-level ladder: advance one level after a losing trade,
    /// reset to level 1 after a winner.
    Gerard,
    /// Continuously adjusted risk percentage with drawdown and
    /// profit-protection thresholds, aimed at funded/prop accounts.
    Benjamin,
}

impl Methodology {
    /// Marker substring whose presence means a file was already patched.
    pub fn marker(&self) -> &'static str {
        match self {
            Methodology::Gerard => "Risk Management (Precise Level Scaling)",
            Methodology::Benjamin => "Risk Management for Funded Accounts",
        }
    }

    /// Suffix appended to the output file's base name.
    pub fn suffix(&self) -> &'static str {
        match self {
            Methodology::Gerard => "_escalado_gerard",
            Methodology::Benjamin => "_escalado_benjamin",
        }
    }

    /// Derive the output entry name: `{basename}{suffix}.{extension}`.
    pub fn output_name(&self, input_name: &str) -> String {
        let path = Path::new(input_name);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(input_name);
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("mq5");
        format!("{}{}.{}", stem, self.suffix(), ext)
    }

    /// Build the transformation recipe for this methodology.
    pub fn recipe(&self) -> Recipe {
        match self {
            Methodology::Gerard => gerard_recipe(),
            Methodology::Benjamin => benjamin_recipe(),
        }
    }
}

impl std::fmt::Display for Methodology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Methodology::Gerard => write!(f, "gerard"),
            Methodology::Benjamin => write!(f, "benjamin"),
        }
    }
}

impl std::str::FromStr for Methodology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gerard" => Ok(Methodology::Gerard),
            "benjamin" => Ok(Methodology::Benjamin),
            _ => Err(format!(
                "Invalid methodology: {}. Valid values are 'gerard' or 'benjamin'",
                s
            )),
        }
    }
}

/// Where an injected block lands relative to its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Block above the line containing the anchor; the anchor line is kept.
    Before,
    /// The line containing the anchor is replaced by the block.
    ReplaceLine,
    /// Block above the first occurrence of the anchor, or appended to the
    /// end of the document when the anchor is absent.
    BeforeOrAppend,
}

/// One anchor-relative block injection.
///
/// Blocks are stored flush-left; the engine re-indents every non-empty line
/// to the leading whitespace of the anchor line. An absent anchor is a
/// recorded no-op, never an error.
#[derive(Debug, Clone)]
pub struct AnchorInjection {
    /// Human-readable step name, used in miss reports.
    pub step: &'static str,
    pub anchor: &'static str,
    pub block: &'static str,
    pub placement: Placement,
}

/// Whole-function swap located by a non-greedy multi-line regex.
#[derive(Debug, Clone)]
pub struct FunctionReplacement {
    pub step: &'static str,
    /// Literal signature prefix, reported when the pattern does not match.
    pub signature: &'static str,
    /// Regex matching from the signature prefix to a closing brace alone at
    /// the start of a line.
    pub pattern: &'static str,
    pub replacement: &'static str,
}

/// Declarative transformation recipe: guard marker, warning fixes, optional
/// function swap, then ordered injections.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub methodology: Methodology,
    pub marker: &'static str,
    pub warning_fixes: &'static [(&'static str, &'static str)],
    pub function_replacement: Option<FunctionReplacement>,
    pub injections: Vec<AnchorInjection>,
    pub success_message: &'static str,
}

// Anchors shared by both recipes. StrategyQuant exports are assumed to
// contain these verbatim; moved or renamed anchors are out of scope.
pub const ANCHOR_MM_INPUTS: &str =
    r#"input string smm = "----------- Money Management - Fixed Amount -----------";"#;
pub const ANCHOR_INIT_SUCCEEDED: &str = "return(INIT_SUCCEEDED);";
pub const ANCHOR_LOT_CALC: &str = r#"size = sqMMFixedAmount("Current",ORDER_TYPE_BUY,openPrice,sl,mmRiskedMoney,mmDecimals,mmLotsIfNoMM,mmMaxLots,mmMultiplier,mmStep);"#;
pub const ANCHOR_FIRST_INCLUDE: &str = "//+----------------------------- Include from";

/// Literal fixes for known MetaEditor warnings, applied before any
/// structural injection so later anchor matches see normalized text.
pub const WARNING_FIXES: &[(&str, &str)] = &[
    (
        r#"return("File not found in the MQL5\Files directory to send on FTP server");"#,
        r#"return("File not found in the MQL5\\Files directory to send on FTP server");"#,
    ),
    ("0.5f", "0.5"),
    ("10.0f", "10.0"),
];

const GERARD_INPUTS: &str = r#"//+------------------------------------------------------------------+
//| Risk Management (Precise Level Scaling)
//+------------------------------------------------------------------+
input string g_riskScalingTitle = "----------- Risk Management (Level Scaling) -----------";
input string g_riskLevels_string = "1.0,1.2,1.6,2.4,3.6,4.5"; // Risk % por nivel, separado por comas

// --- Internal State Variables ---
double g_riskLevels[];          // Array para guardar los niveles de riesgo parseados
int    g_currentTradeLevel;     // Nivel actual del Trade (1-based, ej: 1, 2, 3...)
string g_gv_tradeLevel_key;     // Clave para la Variable Global
"#;

const GERARD_ON_INIT: &str = r#"// --- Inicialización de Gestión de Riesgo por Niveles ---
g_gv_tradeLevel_key = "SQ.TradeLevel." + StrategyID;

string risk_levels_parts[];
StringSplit(g_riskLevels_string, ',', risk_levels_parts);
ArrayResize(g_riskLevels, ArraySize(risk_levels_parts));
for(int i = 0; i < ArraySize(risk_levels_parts); i++)
{
    g_riskLevels[i] = StringToDouble(risk_levels_parts[i]);
}

if(ArraySize(g_riskLevels) == 0)
{
    Alert("Error en Gestión de Riesgo: La cadena de niveles de riesgo está vacía o mal formada.");
    return(INIT_FAILED);
}

if(GlobalVariableCheck(g_gv_tradeLevel_key)) {
    g_currentTradeLevel = (int)GlobalVariableGet(g_gv_tradeLevel_key);
} else {
    g_currentTradeLevel = 1;
    GlobalVariableSet(g_gv_tradeLevel_key, g_currentTradeLevel);
}

VerboseLog("Gestión de Riesgo por Niveles Inicializada. Nivel Actual: ", IntegerToString(g_currentTradeLevel));
// --- Fin de la Inicialización ---"#;

const GERARD_ON_TRADE_TRANSACTION: &str = r#"//+------------------------------------------------------------------+
//| Gestor de Eventos de Transacción para Gestión de Riesgo por Niveles |
//+------------------------------------------------------------------+
void OnTradeTransaction(const MqlTradeTransaction &trans,
                        const MqlTradeRequest &request,
                        const MqlTradeResult &result)
{
if(trans.type == TRADE_TRANSACTION_DEAL_ADD)
{
    if(HistoryDealSelect(trans.deal))
    {
        if(HistoryDealGetInteger(trans.deal, DEAL_MAGIC) == MagicNumber)
        {
            if(HistoryDealGetInteger(trans.deal, DEAL_ENTRY) == DEAL_ENTRY_OUT)
            {
            double dealProfit = HistoryDealGetDouble(trans.deal, DEAL_PROFIT);

            if(dealProfit < 0)
            {
                g_currentTradeLevel++;
                if(g_currentTradeLevel > ArraySize(g_riskLevels))
                {
                    g_currentTradeLevel = ArraySize(g_riskLevels);
                }
                VerboseLog("GESTION POR NIVELES: Trade PERDEDOR. Avanzando al Nivel ", IntegerToString(g_currentTradeLevel));
            }
            else
            {
                g_currentTradeLevel = 1;
                VerboseLog("GESTION POR NIVELES: Trade GANADOR. Reseteando al Nivel 1.");
            }
            GlobalVariableSet(g_gv_tradeLevel_key, g_currentTradeLevel);
            }
        }
    }
}
}"#;

const GERARD_LOT_CALC: &str = r#"// --- Cálculo de Gestión de Riesgo por Niveles ---
if(g_currentTradeLevel < 1 || g_currentTradeLevel > ArraySize(g_riskLevels))
{
   g_currentTradeLevel = 1;
   GlobalVariableSet(g_gv_tradeLevel_key, g_currentTradeLevel);
}

double riskPercentForTrade = g_riskLevels[g_currentTradeLevel - 1];

double moneyToRisk = (initialBalance * riskPercentForTrade) / 100.0;
VerboseLog("GESTION POR NIVELES: Nivel actual: ", IntegerToString(g_currentTradeLevel), ". Arriesgando: ", DoubleToString(riskPercentForTrade, 2), "%. Dinero máximo a arriesgar: ", DoubleToString(moneyToRisk, 2));

size = sqMMFixedAmount("Current",ORDER_TYPE_BUY,openPrice,sl,moneyToRisk,mmDecimals,mmLotsIfNoMM,mmMaxLots,mmMultiplier,mmStep);"#;

// Corrected sqMMFixedAmount: sizing by precise risked amount, with floor
// rounding to the lot step and min/max volume clamping.
const GERARD_MM_FUNCTION: &str = r#"double sqMMFixedAmount(string symbol, ENUM_ORDER_TYPE orderType, double price, double sl, double RiskedMoney, int decimals, double LotsIfNoMM, double MaximumLots, double multiplier, double sizeStep) {
Verbose("Computing Money Management for order - Precise amount");

if(UseMoneyManagement == false) {
    Verbose("Use Money Management = false, MM not used");
    return (mmLotsIfNoMM);
}

string correctedSymbol = correctSymbol(symbol);
sl = NormalizeDouble(sl, (int) SymbolInfoInteger(correctedSymbol, SYMBOL_DIGITS));

double openPrice = price > 0 ? price : SymbolInfoDouble(correctedSymbol, isLongOrder(orderType) ? SYMBOL_ASK : SYMBOL_BID);
double LotSize=0;

if(RiskedMoney <= 0 ) {
    Verbose("Computing Money Management - Incorrect RiskedMoney value, it must be above 0");
    return(0);
}

double PointValue = SymbolInfoDouble(correctedSymbol, SYMBOL_TRADE_TICK_VALUE) / SymbolInfoDouble(correctedSymbol, SYMBOL_TRADE_TICK_SIZE);
double Smallest_Lot = SymbolInfoDouble(correctedSymbol, SYMBOL_VOLUME_MIN);
double Largest_Lot = SymbolInfoDouble(correctedSymbol, SYMBOL_VOLUME_MAX);

if (PointValue <= 0 || MathAbs(openPrice - sl) <= 0) {
    Verbose("Cannot calculate lot size: Point value or SL distance is zero. Using default lot size.");
    return LotsIfNoMM;
}

double oneLotSLDrawdown = PointValue * MathAbs(openPrice - sl);

if(oneLotSLDrawdown > 0) {
    LotSize = RiskedMoney / oneLotSLDrawdown;
}
else {
    LotSize = 0;
}

LotSize = LotSize * multiplier;

if(sizeStep > 0) {
    LotSize = MathFloor(LotSize / sizeStep) * sizeStep;
}

Verbose("Computing Money Management - Smallest_Lot: ", DoubleToString(Smallest_Lot), ", Largest_Lot: ", DoubleToString(Largest_Lot), ", Computed LotSize: ", DoubleToString(LotSize, 8));
Verbose("Money to risk: ", DoubleToString(RiskedMoney), ", Max 1 lot trade drawdown: ", DoubleToString(oneLotSLDrawdown), ", Point value: ", DoubleToString(PointValue));

if(LotSize <= 0) {
    Verbose("Calculated LotSize is <= 0. Using LotsIfNoMM value: ", DoubleToString(LotsIfNoMM), ")");
    LotSize = LotsIfNoMM;
}

if (LotSize < Smallest_Lot) {
    Verbose("Calculated LotSize is too small (", DoubleToString(LotSize,8), "). Minimal allowed is ", DoubleToString(Smallest_Lot), ". Trade will be skipped.");
    return 0;
}
else if (LotSize > Largest_Lot) {
    Verbose("LotSize is too big. LotSize set to maximal allowed market value: ", DoubleToString(Largest_Lot));
    LotSize = Largest_Lot;
}

if(LotSize > MaximumLots) {
    Verbose("LotSize is too big. LotSize set to maximal allowed value (MaximumLots): ", DoubleToString(MaximumLots));
    LotSize = MaximumLots;
}

return (LotSize);
}"#;

const BENJAMIN_INPUTS: &str = r#"//+------------------------------------------------------------------+
//| Risk Management for Funded Accounts
//+------------------------------------------------------------------+
input string g_riskManagementTitle = "----------- Risk Management (Funded Accounts) -----------";
input double g_initialRiskPercent = 1.0;       // Riesgo Inicial %
input double g_riskStep = 0.25;                // Paso de Riesgo % por Ganancia/Pérdida
input double g_maxLossThreshold = -4.0;        // Umbral de Pérdida Máxima %
input double g_maxLossRisk = 1.0;              // Riesgo % tras alcanzar Umbral de Pérdida
input double g_profitProtectThreshold = 4.0;   // Umbral de Protección de Ganancias %
input double g_profitProtectRisk = 0.75;       // Riesgo % tras alcanzar Protección de Ganancias
input double g_minRiskPercent = 0.25;          // Riesgo mínimo permitido %

// --- Variables de estado internas (no modificar)
double g_currentRiskPercent;
double g_totalAccountProfitPercent;
string g_gv_riskPercent_key;
string g_gv_profitPercent_key;
"#;

const BENJAMIN_ON_INIT: &str = r#"// --- Inicialización de Variables de Gestión de Riesgo ---
g_gv_riskPercent_key = "SQ.Risk." + StrategyID;
g_gv_profitPercent_key = "SQ.Profit." + StrategyID;

if(GlobalVariableCheck(g_gv_riskPercent_key)) {
    g_currentRiskPercent = GlobalVariableGet(g_gv_riskPercent_key);
} else {
    g_currentRiskPercent = g_initialRiskPercent;
    GlobalVariableSet(g_gv_riskPercent_key, g_currentRiskPercent);
}

if(GlobalVariableCheck(g_gv_profitPercent_key)) {
    g_totalAccountProfitPercent = GlobalVariableGet(g_gv_profitPercent_key);
} else {
    g_totalAccountProfitPercent = 0.0;
    GlobalVariableSet(g_gv_profitPercent_key, g_totalAccountProfitPercent);
}

VerboseLog("Gestión de Riesgo Inicializada. Riesgo Actual: ", DoubleToString(g_currentRiskPercent, 2), "%, P/L Total: ", DoubleToString(g_totalAccountProfitPercent, 2), "%");
// --- Fin de la Inicialización de Gestión de Riesgo ---"#;

const BENJAMIN_ON_TRADE_TRANSACTION: &str = r#"//+------------------------------------------------------------------+
//| Gestor de Eventos de Transacción para Gestión de Riesgo          |
//+------------------------------------------------------------------+
void OnTradeTransaction(const MqlTradeTransaction &trans,
                        const MqlTradeRequest &request,
                        const MqlTradeResult &result)
{
if(trans.type == TRADE_TRANSACTION_DEAL_ADD)
{
    if(HistoryDealSelect(trans.deal))
    {
        if(HistoryDealGetInteger(trans.deal, DEAL_MAGIC) == MagicNumber)
        {
            if(HistoryDealGetInteger(trans.deal, DEAL_ENTRY) == DEAL_ENTRY_OUT)
            {
            double dealProfit = HistoryDealGetDouble(trans.deal, DEAL_PROFIT);

            if(initialBalance <= 0)
            {
                VerboseLog("Error en Gestión de Riesgo: InitialCapital debe ser > 0 para el cálculo de porcentaje.");
                return;
            }

            double profitPercent = (dealProfit / initialBalance) * 100.0;
            g_totalAccountProfitPercent += profitPercent;

            if(dealProfit >= 0)
            {
                g_currentRiskPercent -= g_riskStep;
                if(g_currentRiskPercent < g_minRiskPercent)
                {
                    g_currentRiskPercent = g_minRiskPercent;
                }
            }
            else
            {
                g_currentRiskPercent += g_riskStep;
            }

            GlobalVariableSet(g_gv_riskPercent_key, g_currentRiskPercent);
            GlobalVariableSet(g_gv_profitPercent_key, g_totalAccountProfitPercent);

            VerboseLog("GESTION DE RIESGO: Trade Cerrado. P/L: ", DoubleToString(dealProfit, 2), " (", DoubleToString(profitPercent, 2), "%). Nuevo P/L Total: ", DoubleToString(g_totalAccountProfitPercent, 2), "%. Próximo Riesgo: ", DoubleToString(g_currentRiskPercent, 2), "%");
            }
        }
    }
}
}"#;

const BENJAMIN_LOT_CALC: &str = r#"// --- Cálculo de Gestión de Riesgo Dinámico ---
double riskPercentForTrade = g_currentRiskPercent;
if(g_totalAccountProfitPercent <= g_maxLossThreshold) {
    riskPercentForTrade = g_maxLossRisk;
    VerboseLog("GESTION DE RIESGO: Protección de Drawdown activada. Riesgo fijado a: ", DoubleToString(riskPercentForTrade, 2), "%");
} else if (g_totalAccountProfitPercent >= g_profitProtectThreshold) {
    riskPercentForTrade = g_profitProtectRisk;
    VerboseLog("GESTION DE RIESGO: Protección de Ganancias activada. Riesgo fijado a: ", DoubleToString(riskPercentForTrade, 2), "%");
}

double moneyToRisk = (initialBalance * riskPercentForTrade) / 100.0;
VerboseLog("GESTION DE RIESGO: Calculando tamaño de lote. Usando riesgo de: ", DoubleToString(riskPercentForTrade, 2), "%. Dinero a arriesgar: ", DoubleToString(moneyToRisk, 2));

size = sqMMFixedAmount("Current",ORDER_TYPE_BUY,openPrice,sl,moneyToRisk,mmDecimals,mmLotsIfNoMM,mmMaxLots,mmMultiplier,mmStep);"#;

fn gerard_recipe() -> Recipe {
    Recipe {
        methodology: Methodology::Gerard,
        marker: Methodology::Gerard.marker(),
        warning_fixes: WARNING_FIXES,
        function_replacement: Some(FunctionReplacement {
            step: "sqMMFixedAmount body",
            signature: "double sqMMFixedAmount(string symbol,",
            pattern: r"(?sm)double sqMMFixedAmount\(string symbol,.*?\)\s*\{.*?^\}",
            replacement: GERARD_MM_FUNCTION,
        }),
        injections: vec![
            AnchorInjection {
                step: "risk inputs",
                anchor: ANCHOR_MM_INPUTS,
                block: GERARD_INPUTS,
                placement: Placement::Before,
            },
            AnchorInjection {
                step: "init block",
                anchor: ANCHOR_INIT_SUCCEEDED,
                block: GERARD_ON_INIT,
                placement: Placement::Before,
            },
            AnchorInjection {
                step: "lot sizing",
                anchor: ANCHOR_LOT_CALC,
                block: GERARD_LOT_CALC,
                placement: Placement::ReplaceLine,
            },
            AnchorInjection {
                step: "trade transaction handler",
                anchor: ANCHOR_FIRST_INCLUDE,
                block: GERARD_ON_TRADE_TRANSACTION,
                placement: Placement::BeforeOrAppend,
            },
        ],
        success_message: "risk management injected - precise level scaling",
    }
}

fn benjamin_recipe() -> Recipe {
    Recipe {
        methodology: Methodology::Benjamin,
        marker: Methodology::Benjamin.marker(),
        warning_fixes: WARNING_FIXES,
        function_replacement: None,
        injections: vec![
            AnchorInjection {
                step: "risk inputs",
                anchor: ANCHOR_MM_INPUTS,
                block: BENJAMIN_INPUTS,
                placement: Placement::Before,
            },
            AnchorInjection {
                step: "init block",
                anchor: ANCHOR_INIT_SUCCEEDED,
                block: BENJAMIN_ON_INIT,
                placement: Placement::Before,
            },
            AnchorInjection {
                step: "lot sizing",
                anchor: ANCHOR_LOT_CALC,
                block: BENJAMIN_LOT_CALC,
                placement: Placement::ReplaceLine,
            },
            AnchorInjection {
                step: "trade transaction handler",
                anchor: ANCHOR_FIRST_INCLUDE,
                block: BENJAMIN_ON_TRADE_TRANSACTION,
                placement: Placement::BeforeOrAppend,
            },
        ],
        success_message: "risk management injected - funded account scaling",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_name_gerard() {
        let name = Methodology::Gerard.output_name("Strategy.mq5");
        assert_eq!(name, "Strategy_escalado_gerard.mq5");
    }

    #[test]
    fn test_output_name_benjamin_preserves_extension() {
        let name = Methodology::Benjamin.output_name("ES Breakout v2.mq5");
        assert_eq!(name, "ES Breakout v2_escalado_benjamin.mq5");
    }

    #[test]
    fn test_methodology_from_str() {
        assert_eq!("gerard".parse::<Methodology>(), Ok(Methodology::Gerard));
        assert_eq!("Benjamin".parse::<Methodology>(), Ok(Methodology::Benjamin));
        assert!("martingale".parse::<Methodology>().is_err());
    }

    #[test]
    fn test_recipes_bind_distinct_markers() {
        let gerard = Methodology::Gerard.recipe();
        let benjamin = Methodology::Benjamin.recipe();
        assert_ne!(gerard.marker, benjamin.marker);
        // Each recipe's input block must contain its own marker so the
        // guard trips on a second application.
        assert!(gerard.injections[0].block.contains(gerard.marker));
        assert!(benjamin.injections[0].block.contains(benjamin.marker));
        assert!(!gerard.injections[0].block.contains(benjamin.marker));
    }

    #[test]
    fn test_injection_order_is_fixed() {
        for methodology in [Methodology::Gerard, Methodology::Benjamin] {
            let steps: Vec<&str> = methodology
                .recipe()
                .injections
                .iter()
                .map(|i| i.step)
                .collect();
            assert_eq!(
                steps,
                vec![
                    "risk inputs",
                    "init block",
                    "lot sizing",
                    "trade transaction handler"
                ]
            );
        }
    }
}
