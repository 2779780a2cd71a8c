use std::fmt;

/// Recruiters visiting campus this season.
pub const COMPANIES: &[&str] = &[
    "NUTANIX", "Cognizant", "accenture", "Capgemini", "LTI", "Infosys",
    "AMADEUS", "GlobalLogic", "BRISTLECONE", "vconstruct", "ZS",
    "Aspect Ratio", "VarroC", "mahindra", "Schneider Electric", "Cognida.ai",
    "SoftLink International", "Principal", "PHILIPS", "C&R Software", "Eaton",
    "Finastra", "DE Shaw & Co", "EPAM", "Sagacious IP", "Porter", "TURING",
    "Siemens", "Nexcellerate Technologies", "Kickdrum", "HSBC", "Nvidia",
    "Carrier", "Planful", "Fendahl", "Pubmatic", "Trimble", "YOptima",
    "Bluealtair", "JSW", "GOCOMET", "AVEVA", "Chegg", "JTP", "Darwinbox",
    "TIAA", "Quantiphi", "Demand Farm", "Taurani Holdings", "emami",
    "Muthoot Finance", "DeltaX", "Innovaptive Inc", "Raja Software Labs",
    "Hitachi Energy", "ALPHAWAVE SEMI", "Adani", "CEAT", "Hexaware",
    "ArcelorMittal Nippon Steel India", "Solar Industries", "Grindwell Norton",
    "Acmegrade", "Grappus", "Cloud 4C", "TravClan", "Tata Technologies",
    "Tata Asset Management", "Tata Hitachi", "Blue Star", "AFCONS",
    "Telaverge Communications", "Asian Heart Institute",
];

const TECHNOLOGY: &[&str] = &[
    "NUTANIX", "Nvidia", "EPAM", "GlobalLogic", "Infosys", "Cognizant", "accenture", "Capgemini", "LTI",
];
const CONSULTING: &[&str] = &["ZS", "Aspect Ratio", "DE Shaw & Co", "Principal"];
const MANUFACTURING: &[&str] = &["mahindra", "Siemens", "Tata Technologies", "JSW", "Adani"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Technology,
    Consulting,
    Manufacturing,
    Other,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Category::Technology => "Technology",
            Category::Consulting => "Consulting",
            Category::Manufacturing => "Manufacturing",
            Category::Other => "Other",
        };
        f.write_str(label)
    }
}

/// Case-insensitive substring match against any of the markers.
fn matches_any(company: &str, markers: &[&str]) -> bool {
    let company = company.to_lowercase();
    markers
        .iter()
        .any(|marker| company.contains(&marker.to_lowercase()))
}

pub fn categorize(company: &str) -> Category {
    if matches_any(company, TECHNOLOGY) {
        Category::Technology
    } else if matches_any(company, CONSULTING) {
        Category::Consulting
    } else if matches_any(company, MANUFACTURING) {
        Category::Manufacturing
    } else {
        Category::Other
    }
}

/// Static, searchable company list.
#[derive(Clone, Debug)]
pub struct CompanyDirectory {
    companies: Vec<String>,
}

impl Default for CompanyDirectory {
    fn default() -> Self {
        Self::new(COMPANIES.iter().map(|name| name.to_string()))
    }
}

impl CompanyDirectory {
    pub fn new(companies: impl IntoIterator<Item = String>) -> Self {
        Self {
            companies: companies.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.companies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }

    /// Companies whose name contains `term`, ignoring case. Empty term matches all.
    pub fn search(&self, term: &str) -> Vec<&str> {
        let needle = term.trim().to_lowercase();
        self.companies
            .iter()
            .filter(|company| company.to_lowercase().contains(&needle))
            .map(String::as_str)
            .collect()
    }

    /// Resolve a selection by exact (case-insensitive) name, then by unique partial match.
    pub fn find(&self, name: &str) -> Option<&str> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        if let Some(exact) = self
            .companies
            .iter()
            .find(|company| company.to_lowercase() == wanted)
        {
            return Some(exact.as_str());
        }
        match self.search(&wanted).as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}
