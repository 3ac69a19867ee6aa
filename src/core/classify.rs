//! Sector labels for funds and the trading status of the mainland market.
use crate::core::fund::HoldingEntry;
use crate::providers::util::china_offset;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Weekday};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt::Display;

/// Name keyword rules, checked in order against the upper-cased fund name.
const SECTOR_RULES: &[(&str, &[&str])] = &[
    ("新能源", &["新能源", "光伏", "电池", "低碳", "环保", "智能汽车", "宁德", "隆基", "比亚迪"]),
    ("半导体", &["半导体", "芯片", "集成电路", "电子", "信息", "卓胜微", "中芯", "韦尔"]),
    ("医疗医药", &["医药", "医疗", "健康", "生物", "药", "创新药", "葛兰", "药明", "恒瑞"]),
    ("白酒消费", &["消费", "白酒", "内需", "食品", "饮料", "酒", "茅台", "五粮液"]),
    ("军工高端制造", &["军工", "高端制造", "航天", "国防", "装备", "航空", "船舶"]),
    ("金融地产", &["银行", "地产", "金融", "证券", "保险", "非银", "信托"]),
    ("互联网/AI", &["互联网", "软件", "人工智能", "计算机", "传媒", "游戏", "云计算", "AI", "科技"]),
    ("QDII/海外", &["纳斯达克", "标普", "恒生", "美股", "越南", "海外", "QDII", "标普500"]),
    ("债券/固收", &["债券", "固收", "双利", "纯债", "添利", "信用债", "可转债"]),
    ("红利", &["红利", "股息", "红利etf", "高股息"]),
    ("上证50", &["上证50", "50etf"]),
    ("沪深300", &["沪深300", "hs300", "300etf"]),
    ("中证500", &["中证500", "zz500", "500etf"]),
    ("中证1000", &["中证1000", "1000etf"]),
    ("创业板", &["创业板", "创业板指", "创业50", "创业板etf"]),
    ("科创", &["科创", "科创50", "科创50etf"]),
    ("黄金", &["黄金", "有色", "黄金etf"]),
];

const HOLDINGS_SECTORS: &[(&str, &[&str])] = &[
    (
        "白酒消费",
        &[
            "贵州茅台", "五粮液", "泸州老窖", "山西汾酒", "洋河股份", "古井贡酒", "今世缘",
            "伊利股份", "海天味业", "美的集团", "格力电器", "海尔智家", "中国中免", "牧原股份",
        ],
    ),
    (
        "医疗医药",
        &[
            "药明康德", "药明生物", "恒瑞医药", "迈瑞医疗", "爱尔眼科", "长春高新", "智飞生物",
            "沃森生物", "康泰生物", "华兰生物", "片仔癀", "云南白药", "同仁堂",
        ],
    ),
    (
        "新能源",
        &[
            "宁德时代", "隆基绿能", "比亚迪", "阳光电源", "通威股份", "TCL中环", "晶澳科技",
            "天合光能", "亿纬锂能", "恩捷股份", "璞泰来", "天赐材料", "德方纳米", "容百科技",
            "当升科技",
        ],
    ),
    (
        "半导体",
        &[
            "中芯国际", "韦尔股份", "卓胜微", "北方华创", "兆易创新", "澜起科技", "长电科技",
            "通富微电", "华天科技", "中微公司", "拓荆科技",
        ],
    ),
    (
        "军工高端制造",
        &[
            "航发动力", "中航沈飞", "中航西飞", "中航光电", "中航重机", "航天电器", "紫光国微",
            "中兵红箭",
        ],
    ),
    (
        "金融地产",
        &[
            "招商银行", "中国平安", "中信证券", "东方财富", "工商银行", "建设银行", "中国银行",
            "农业银行", "兴业银行", "浦发银行", "平安银行", "宁波银行", "华泰证券", "国泰君安",
            "广发证券", "海通证券",
        ],
    ),
    (
        "互联网/AI",
        &[
            "腾讯控股", "阿里巴巴", "美团", "拼多多", "快手", "京东集团", "网易", "百度", "三六零",
            "科大讯飞", "金山办公", "中际旭创", "新易盛",
        ],
    ),
    (
        "传统能源",
        &["中国石油", "中国石化", "中国神华", "陕西煤业", "兖矿能源", "中国海油"],
    ),
    (
        "黄金",
        &["紫金矿业", "山东黄金", "中金黄金", "江西铜业", "云南铜业", "洛阳钼业"],
    ),
    ("钢铁", &["宝钢股份", "华菱钢铁", "新钢股份"]),
    ("化工", &["万华化学", "华鲁恒升", "龙佰集团"]),
    (
        "汽车",
        &["上汽集团", "长城汽车", "吉利汽车", "长安汽车", "广汽集团", "赛力斯"],
    ),
];

lazy_static! {
    static ref SECTOR_BY_STOCK: HashMap<&'static str, &'static str> = HOLDINGS_SECTORS
        .iter()
        .flat_map(|(sector, stocks)| stocks.iter().map(move |stock| (*stock, *sector)))
        .collect();
}

/// Number of top holdings that vote on the sector.
const VOTING_HOLDINGS: usize = 3;

/// Sector label of a fund. The top holdings decide when any of them is a
/// known stock; otherwise the fund name and then the fund type are used.
pub fn sector_label(name: &str, fund_type: Option<&str>, holdings: &[HoldingEntry]) -> &'static str {
    if let Some(sector) = holdings_sector(holdings) {
        return sector;
    }

    let name = name.to_uppercase();
    for (label, keywords) in SECTOR_RULES {
        if keywords.iter().any(|kw| name.contains(&kw.to_uppercase())) {
            return *label;
        }
    }

    let fund_type = fund_type.unwrap_or_default();
    if fund_type.contains("指数") {
        "指数型"
    } else if fund_type.contains("债券") {
        "债券型"
    } else if fund_type.contains("货币") {
        "货币型"
    } else {
        "混合/其他"
    }
}

/// Most frequent sector among the top holdings; the first one seen wins ties.
fn holdings_sector(holdings: &[HoldingEntry]) -> Option<&'static str> {
    let mut counts: Vec<(&'static str, usize)> = Vec::new();
    for holding in holdings.iter().take(VOTING_HOLDINGS) {
        let Some(&sector) = SECTOR_BY_STOCK.get(holding.name.trim()) else {
            continue;
        };
        match counts.iter_mut().find(|(s, _)| *s == sector) {
            Some((_, count)) => *count += 1,
            None => counts.push((sector, 1)),
        }
    }

    let mut best: Option<(&'static str, usize)> = None;
    for (sector, count) in counts {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((sector, count));
        }
    }
    best.map(|(sector, _)| sector)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketStatus {
    Pending,
    Open,
    LunchBreak,
    Closed,
}

impl MarketStatus {
    pub fn label(&self) -> &'static str {
        match self {
            MarketStatus::Pending => "待开盘",
            MarketStatus::Open => "交易中",
            MarketStatus::LunchBreak => "午间休市",
            MarketStatus::Closed => "已休市",
        }
    }
}

impl Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

const fn minute_of_day(hour: u32, minute: u32) -> u32 {
    hour * 60 + minute
}

/// Trading session at `now`, evaluated in China Standard Time.
pub fn market_status<Tz: TimeZone>(now: &DateTime<Tz>) -> MarketStatus {
    let local = now.with_timezone(&china_offset());
    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return MarketStatus::Closed;
    }

    let minute = minute_of_day(local.hour(), local.minute());
    if minute < minute_of_day(9, 30) {
        MarketStatus::Pending
    } else if minute < minute_of_day(11, 30) {
        MarketStatus::Open
    } else if minute < minute_of_day(13, 0) {
        MarketStatus::LunchBreak
    } else if minute < minute_of_day(15, 0) {
        MarketStatus::Open
    } else {
        MarketStatus::Closed
    }
}
