//! ANT+ manufacturer ids, as used by common page 80.

/// Look up the registered name of an ANT+ manufacturer id.
pub fn manufacturer_name(id: u16) -> Option<&'static str> {
    let name = match id {
        1 => "garmin",
        2 => "garmin_fr405_antfs",
        3 => "zephyr",
        4 => "dayton",
        5 => "idt",
        6 => "srm",
        7 => "quarq",
        8 => "ibike",
        9 => "saris",
        10 => "spark_hk",
        11 => "tanita",
        12 => "echowell",
        13 => "dynastream_oem",
        14 => "nautilus",
        15 => "dynastream",
        16 => "timex",
        17 => "metrigear",
        18 => "xelic",
        19 => "beurer",
        20 => "cardiosport",
        21 => "a_and_d",
        22 => "hmm",
        23 => "suunto",
        24 => "thita_elektronik",
        25 => "gpulse",
        26 => "clean_mobile",
        27 => "pedal_brain",
        28 => "peaksware",
        29 => "saxonar",
        30 => "lemond_fitness",
        31 => "dexcom",
        32 => "wahoo_fitness",
        33 => "octane_fitness",
        34 => "archinoetics",
        35 => "the_hurt_box",
        36 => "citizen_systems",
        37 => "magellan",
        38 => "osynce",
        39 => "holux",
        40 => "concept2",
        41 => "shimano",
        42 => "one_giant_leap",
        43 => "ace_sensor",
        44 => "brim_brothers",
        45 => "xplova",
        46 => "perception_digital",
        47 => "bf1systems",
        48 => "pioneer",
        49 => "spantec",
        50 => "metalogics",
        51 => "4iiiis",
        52 => "seiko_epson",
        53 => "seiko_epson_oem",
        54 => "ifor_powell",
        55 => "maxwell_guider",
        56 => "star_trac",
        57 => "breakaway",
        58 => "alatech_technology_ltd",
        59 => "mio_technology_europe",
        60 => "rotor",
        61 => "geonaute",
        62 => "id_bike",
        63 => "specialized",
        64 => "wtek",
        65 => "physical_enterprises",
        66 => "north_pole_engineering",
        67 => "bkool",
        68 => "cateye",
        69 => "stages_cycling",
        70 => "sigmasport",
        71 => "tomtom",
        72 => "peripedal",
        73 => "wattbike",
        76 => "moxy",
        77 => "ciclosport",
        78 => "powerbahn",
        79 => "acorn_projects_aps",
        80 => "lifebeam",
        81 => "bontrager",
        82 => "wellgo",
        83 => "scosche",
        84 => "magura",
        85 => "woodway",
        86 => "elite",
        87 => "nielsen_kellerman",
        88 => "dk_city",
        89 => "tacx",
        90 => "direction_technology",
        91 => "magtonic",
        92 => "1partcarbon",
        93 => "inside_ride_technologies",
        94 => "sound_of_motion",
        95 => "stryd",
        96 => "icg",
        97 => "mipulse",
        98 => "bsx_athletics",
        99 => "look",
        100 => "campagnolo_srl",
        101 => "body_bike_smart",
        102 => "praxisworks",
        103 => "limits_technology",
        104 => "topaction_technology",
        105 => "cosinuss",
        106 => "fitcare",
        107 => "magene",
        108 => "giant_manufacturing_co",
        109 => "tigrasport",
        110 => "salutron",
        111 => "technogym",
        112 => "bryton_sensors",
        113 => "latitude_limited",
        114 => "soaring_technology",
        115 => "igpsport",
        116 => "thinkrider",
        117 => "gopher_sport",
        118 => "waterrower",
        119 => "orangetheory",
        120 => "inpeak",
        121 => "kinetic",
        122 => "johnson_health_tech",
        123 => "polar_electro",
        124 => "seesense",
        125 => "nci_technology",
        255 => "development",
        258 => "lezyne",
        260 => "zwift",
        263 => "favero_electronics",
        265 => "strava",
        267 => "bryton",
        268 => "sram",
        281 => "trainer_road",
        289 => "hammerhead",
        294 => "coros",
        _ => return None,
    };
    Some(name)
}
